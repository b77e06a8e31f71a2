//! Per-category playback budgets.
//!
//! A budget caps how many instances of one category are audible at once, on top of
//! (and independent from) the hardware voice limit. Members over the cap are
//! suspended rather than destroyed and come back once they rank within the cap again.

use std::sync::Arc;

/// Category of a playback request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SoundCategory {
    /// One-shot effects, limited only by available voices
    #[default]
    Effect,
    /// Ambient beds and pads
    Ambient,
    Music,
}

impl SoundCategory {
    /// Whether instances of this category go through a budget queue.
    pub fn is_budgeted(&self) -> bool {
        !matches!(self, Self::Effect)
    }
}

impl std::fmt::Display for SoundCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Effect => write!(f, "effect"),
            Self::Ambient => write!(f, "ambient"),
            Self::Music => write!(f, "music"),
        }
    }
}

/// Something that can compete for a budget slot.
pub trait BudgetMember {
    fn priority(&self) -> i32;
    fn set_priority(&self, priority: i32);
    fn is_disposed(&self) -> bool;
    fn set_suspended(&self, suspended: bool);
}

/// Audibility change produced by [`BudgetQueue::update`].
#[derive(Debug)]
pub enum BudgetChange<T> {
    Suspended(Arc<T>),
    Resumed(Arc<T>),
}

#[derive(Debug)]
struct BudgetEntry<T> {
    member: Arc<T>,
    seq: u64,
    audible: bool,
}

/// Priority-ordered queue enforcing a concurrency cap for one category.
#[derive(Debug)]
pub struct BudgetQueue<T: BudgetMember> {
    category: SoundCategory,
    cap: usize,
    entries: Vec<BudgetEntry<T>>,
    next_seq: u64,
}

impl<T: BudgetMember> BudgetQueue<T> {
    pub fn new(category: SoundCategory, cap: usize) -> Self {
        Self {
            category,
            cap,
            entries: Vec::new(),
            next_seq: 0,
        }
    }

    pub fn category(&self) -> SoundCategory {
        self.category
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Changes the cap; takes effect on the next [`update`](Self::update).
    pub fn set_cap(&mut self, cap: usize) {
        self.cap = cap;
    }

    /// Adds a member with the given priority. Audibility is decided by the next
    /// [`update`](Self::update); no voice is granted here.
    pub fn enqueue(&mut self, member: Arc<T>, priority: i32) {
        member.set_priority(priority);
        let seq = self.next_seq;
        self.next_seq += 1;

        // Insert after every entry of equal or higher priority
        let index = self
            .entries
            .iter()
            .position(|e| e.member.priority() < priority)
            .unwrap_or(self.entries.len());
        self.entries.insert(
            index,
            BudgetEntry {
                member,
                seq,
                audible: true,
            },
        );
    }

    /// Re-ranks the queue and suspends everything past the cap.
    ///
    /// Disposed members are dropped first. Ranking is by descending priority, ties
    /// by enqueue order, using each member's current priority.
    pub fn update(&mut self) -> Vec<BudgetChange<T>> {
        self.entries.retain(|e| !e.member.is_disposed());
        self.entries.sort_by(|a, b| {
            b.member
                .priority()
                .cmp(&a.member.priority())
                .then(a.seq.cmp(&b.seq))
        });

        let mut changes = Vec::new();
        for (rank, entry) in self.entries.iter_mut().enumerate() {
            let audible = rank < self.cap;
            entry.member.set_suspended(!audible);
            if audible != entry.audible {
                entry.audible = audible;
                changes.push(if audible {
                    BudgetChange::Resumed(entry.member.clone())
                } else {
                    BudgetChange::Suspended(entry.member.clone())
                });
            }
        }

        if !changes.is_empty() {
            log::debug!(
                "{} budget: {} queued, {} audible (cap {})",
                self.category,
                self.entries.len(),
                self.entries.len().min(self.cap),
                self.cap
            );
        }
        changes
    }

    /// Members within the cap as of the last update, highest priority first.
    pub fn audible(&self) -> Vec<Arc<T>> {
        self.entries
            .iter()
            .filter(|e| e.audible)
            .map(|e| e.member.clone())
            .collect()
    }

    /// Members held back by the cap as of the last update.
    pub fn suspended(&self) -> Vec<Arc<T>> {
        self.entries
            .iter()
            .filter(|e| !e.audible)
            .map(|e| e.member.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
