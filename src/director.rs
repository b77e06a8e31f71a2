//! The playback director: owns the voice pool, the live instances, the budgets and
//! the streaming worker, and drives them all from [`PlaybackDirector::update`].

use crate::assets::{AssetProvider, AssetRef};
use crate::backend::AudioBackend;
use crate::budget::{BudgetChange, BudgetQueue, SoundCategory};
use crate::config::{DirectorDesc, EnvironmentSettings, PlayParams};
use crate::error::{PetalSonicError, Result};
use crate::events::DirectorEvent;
use crate::math::Vec3;
use crate::playback::{Emitter, InstanceContext, InstanceSetup, PlayCounters, SoundInstance};
use crate::spatial::{EntityId, ListenerState, SpatialEntityProvider};
use crate::streaming::{StreamingQueue, StreamingTask, StreamingWorker};
use crate::voice_pool::VoicePool;
use crossbeam_channel::{Receiver, Sender};
use std::cmp::Reverse;
use std::sync::Arc;

/// Lifecycle of the output device as seen by the director.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Uninitialized,
    Available,
    /// Initialization failed; every play request yields a silent instance
    Unavailable,
    ShutDown,
}

/// Snapshot of playback telemetry, refreshed at the end of every update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectorStats {
    pub playing_2d: usize,
    pub playing_3d: usize,
    pub peak_2d: usize,
    pub peak_3d: usize,
    pub live_instances: usize,
    pub voices_in_use: usize,
    pub ticks: u64,
}

/// Central playback coordinator.
///
/// All mutation happens on the thread that owns the director (usually the game's main
/// loop); only buffer refills for streamed instances run on the background worker.
///
/// ```no_run
/// use petalsonic_director::{AssetRef, DirectorDesc, NullBackend, PlaybackDirector};
/// # use petalsonic_director::{AssetProvider, SpatialEntityProvider};
/// # use std::sync::Arc;
/// # fn run(assets: Arc<dyn AssetProvider>, entities: Arc<dyn SpatialEntityProvider>) {
/// let mut director = PlaybackDirector::new(
///     DirectorDesc::default(),
///     Arc::new(NullBackend),
///     assets,
///     entities,
/// );
/// director.initialize();
///
/// let click = director.play_sound(&AssetRef::new("ui/click"));
/// director.update();
/// assert!(click.is_disposed());
/// # }
/// ```
pub struct PlaybackDirector {
    desc: DirectorDesc,
    backend: Arc<dyn AudioBackend>,
    assets: Arc<dyn AssetProvider>,
    entities: Arc<dyn SpatialEntityProvider>,
    state: DeviceState,
    backend_open: bool,
    voices: VoicePool,
    instances: Vec<Arc<SoundInstance>>,
    ambient: BudgetQueue<SoundInstance>,
    music: BudgetQueue<SoundInstance>,
    counters: Arc<PlayCounters>,
    listener: ListenerState,
    muted: bool,
    environment: EnvironmentSettings,
    streaming_queue: Arc<StreamingQueue>,
    streaming: Option<StreamingWorker>,
    settings_tx: Sender<EnvironmentSettings>,
    settings_rx: Receiver<EnvironmentSettings>,
    event_tx: Sender<DirectorEvent>,
    event_rx: Receiver<DirectorEvent>,
    stats: DirectorStats,
}

impl PlaybackDirector {
    /// Creates a director. Nothing touches the backend until [`initialize`](Self::initialize).
    pub fn new(
        desc: DirectorDesc,
        backend: Arc<dyn AudioBackend>,
        assets: Arc<dyn AssetProvider>,
        entities: Arc<dyn SpatialEntityProvider>,
    ) -> Self {
        let (settings_tx, settings_rx) = crossbeam_channel::unbounded();
        let (event_tx, event_rx) = crossbeam_channel::unbounded();

        Self {
            ambient: BudgetQueue::new(SoundCategory::Ambient, desc.ambient_cap),
            music: BudgetQueue::new(SoundCategory::Music, desc.music_cap),
            environment: desc.environment,
            desc,
            backend,
            assets,
            entities,
            state: DeviceState::Uninitialized,
            backend_open: false,
            voices: VoicePool::empty(),
            instances: Vec::new(),
            counters: Arc::new(PlayCounters::new()),
            listener: ListenerState::new(),
            muted: false,
            streaming_queue: Arc::new(StreamingQueue::new()),
            streaming: None,
            settings_tx,
            settings_rx,
            event_tx,
            event_rx,
            stats: DirectorStats::default(),
        }
    }

    /// Opens the device, allocates voices and starts the streaming worker.
    ///
    /// Never fails: on error the director logs it, emits
    /// [`DirectorEvent::DeviceUnavailable`] and keeps running silently.
    pub fn initialize(&mut self) {
        if self.state != DeviceState::Uninitialized {
            log::warn!("Playback director already initialized ({:?})", self.state);
            return;
        }

        match self.try_initialize() {
            Ok(()) => {
                self.state = DeviceState::Available;
                log::info!(
                    "Playback director ready with {} voices",
                    self.voices.capacity()
                );
            }
            Err(e) => {
                log::error!("Audio device unavailable: {}", e);
                self.state = DeviceState::Unavailable;
                let _ = self.event_tx.send(DirectorEvent::DeviceUnavailable {
                    reason: e.to_string(),
                });
            }
        }
    }

    fn try_initialize(&mut self) -> Result<()> {
        self.desc.validate()?;
        let info = self.backend.open()?;
        self.backend_open = true;
        log::info!("Opened audio device '{}'", info.device_name);

        self.voices = VoicePool::probe(&*self.backend, self.desc.max_voices);
        if self.voices.capacity() == 0 {
            return Err(PetalSonicError::VoiceAllocation(
                "Backend provided no voices".into(),
            ));
        }

        self.backend.set_environment(&self.environment);
        self.streaming = Some(StreamingWorker::spawn(
            self.backend.clone(),
            self.streaming_queue.clone(),
            &self.desc.streaming,
        )?);
        Ok(())
    }

    /// Plays an asset without spatialization.
    pub fn play_sound(&mut self, asset: &AssetRef) -> Arc<SoundInstance> {
        self.play(asset, Emitter::NonSpatial, PlayParams::default())
    }

    /// Plays an asset at a fixed world position.
    pub fn play_sound_3d(&mut self, asset: &AssetRef, position: Vec3) -> Arc<SoundInstance> {
        self.play(asset, Emitter::Fixed(position), PlayParams::default())
    }

    /// Plays an asset that follows `entity`, with `offset` in the entity's local space.
    pub fn play_sound_attached(
        &mut self,
        asset: &AssetRef,
        entity: EntityId,
        offset: Option<Vec3>,
    ) -> Arc<SoundInstance> {
        let offset = offset.unwrap_or(Vec3::ZERO);
        self.play(asset, Emitter::Attached { entity, offset }, PlayParams::default())
    }

    /// Creates an instance for `asset`.
    ///
    /// The instance does not hold a voice until the next [`update`](Self::update). When
    /// the device or the asset is unavailable the returned instance is already disposed.
    pub fn play(
        &mut self,
        asset: &AssetRef,
        emitter: Emitter,
        params: PlayParams,
    ) -> Arc<SoundInstance> {
        if self.state != DeviceState::Available {
            log::trace!("Device unavailable, {} plays silently", asset);
            return SoundInstance::silent(asset.clone(), emitter, params);
        }
        if !self.assets.is_available(asset) {
            log::warn!("Asset {} is not available", asset);
            return SoundInstance::silent(asset.clone(), emitter, params);
        }

        let stream = match self.assets.open_stream(asset) {
            Ok(stream) => stream,
            Err(e) => {
                log::warn!("Failed to open stream for {}: {}", asset, e);
                return SoundInstance::silent(asset.clone(), emitter, params);
            }
        };

        let category = params.category;
        let priority = params.priority;
        let instance = SoundInstance::new(InstanceSetup {
            asset: asset.clone(),
            emitter,
            params,
            stream,
            counters: self.counters.clone(),
            counting_key: self.counting_key(asset),
            chunk_samples: self.desc.streaming.chunk_samples,
            max_queued_buffers: self.desc.streaming.max_queued_buffers,
        });

        if let Some(budget) = self.budget_mut(category) {
            budget.enqueue(instance.clone(), priority);
        }
        self.instances.push(instance.clone());
        log::debug!("Playing {} as {} ({})", asset, instance.id(), category);
        instance
    }

    /// Number of live instances playing `asset`.
    ///
    /// Always 0 for unavailable and runtime-only assets.
    pub fn playing_count(&self, asset: &AssetRef) -> usize {
        if !self.assets.is_available(asset) {
            return 0;
        }
        self.counting_key(asset)
            .map_or(0, |key| self.counters.count(&key))
    }

    /// Runs one playback tick.
    pub fn update(&mut self) {
        if self.state != DeviceState::Available {
            return;
        }

        self.apply_settings_changes();
        self.update_budgets();
        self.update_listener();
        self.advance_instances();

        self.instances.retain(|instance| !instance.is_disposed());
        // sort_by_key is stable, equal priorities keep their play order
        self.instances
            .sort_by_key(|instance| Reverse(instance.priority()));

        self.record_stats();
    }

    fn apply_settings_changes(&mut self) {
        let Some(settings) = self.settings_rx.try_iter().last() else {
            return;
        };
        if settings == self.environment {
            return;
        }
        log::info!("Applying environment settings {:?}", settings);
        self.environment = settings;
        self.backend.set_environment(&settings);
        let _ = self
            .event_tx
            .send(DirectorEvent::EnvironmentChanged { settings });
    }

    fn update_budgets(&mut self) {
        let mut changes = self.ambient.update();
        changes.extend(self.music.update());

        for change in changes {
            let event = match change {
                BudgetChange::Suspended(instance) => {
                    log::debug!("{} suspended by its budget", instance.id());
                    DirectorEvent::InstanceSuspended {
                        instance: instance.id(),
                    }
                }
                BudgetChange::Resumed(instance) => {
                    log::debug!("{} resumed by its budget", instance.id());
                    DirectorEvent::InstanceResumed {
                        instance: instance.id(),
                    }
                }
            };
            let _ = self.event_tx.send(event);
        }
    }

    fn update_listener(&mut self) {
        let previous = self.listener.entity();
        self.listener.refresh(&*self.entities);
        if self.listener.entity() != previous {
            let _ = self.event_tx.send(DirectorEvent::ListenerChanged {
                entity: self.listener.entity(),
            });
        }

        let gain = if self.muted {
            0.0
        } else {
            self.desc.master_gain
        };
        self.backend.set_listener(&self.listener.params(gain));
    }

    fn advance_instances(&mut self) {
        for index in 0..self.instances.len() {
            let instance = self.instances[index].clone();
            if instance.wants_voice() && self.voices.is_exhausted() {
                self.steal_voice_for(&instance);
            }

            let mut ctx = InstanceContext {
                voices: &mut self.voices,
                backend: &*self.backend,
                entities: &*self.entities,
                streaming: &self.streaming_queue,
                events: &self.event_tx,
            };
            instance.advance(&mut ctx);
        }
    }

    /// Evicts the lowest-priority voiced instance ranked strictly below `instance`.
    fn steal_voice_for(&mut self, instance: &Arc<SoundInstance>) {
        let priority = instance.priority();
        let victim = self
            .instances
            .iter()
            .rev()
            .filter(|other| {
                other.id() != instance.id()
                    && !other.is_disposed()
                    && other.has_voice()
                    && other.priority() < priority
            })
            .min_by_key(|other| other.priority())
            .cloned();

        let Some(victim) = victim else {
            return;
        };

        log::debug!(
            "{} (priority {}) takes the voice of {} (priority {})",
            instance.id(),
            priority,
            victim.id(),
            victim.priority()
        );
        victim.evict(&mut self.voices, &*self.backend);
        let _ = self.event_tx.send(DirectorEvent::InstanceEvicted {
            instance: victim.id(),
            by: instance.id(),
        });
    }

    fn record_stats(&mut self) {
        let playing_2d = self.counters.playing_2d();
        let playing_3d = self.counters.playing_3d();
        let stats = &mut self.stats;
        stats.playing_2d = playing_2d;
        stats.playing_3d = playing_3d;
        stats.peak_2d = stats.peak_2d.max(playing_2d);
        stats.peak_3d = stats.peak_3d.max(playing_3d);
        stats.live_instances = self.instances.len();
        stats.voices_in_use = self.voices.capacity() - self.voices.available();
        stats.ticks += 1;

        log::trace!(
            "Tick {}: {} 2D / {} 3D playing, {} voices in use",
            stats.ticks,
            playing_2d,
            playing_3d,
            stats.voices_in_use
        );
    }

    /// Registers a streamed instance with the worker. Returns `false` if it was
    /// already registered.
    pub fn enqueue_for_streaming(&self, instance: &Arc<SoundInstance>) -> bool {
        if !instance.requires_streaming() {
            return false;
        }
        let task: Arc<dyn StreamingTask> = instance.clone();
        self.streaming_queue.enqueue(task)
    }

    /// Stops every live instance. Voices are returned on the next update.
    pub fn stop_all(&mut self) {
        log::debug!("Stopping {} instances", self.instances.len());
        for instance in &self.instances {
            instance.stop();
        }
    }

    /// Tears everything down: worker, instances, voices, backend context and cached
    /// audio. Safe to call more than once; also runs on drop.
    pub fn shutdown(&mut self) {
        match self.state {
            DeviceState::ShutDown => return,
            DeviceState::Uninitialized => {
                self.state = DeviceState::ShutDown;
                return;
            }
            DeviceState::Available | DeviceState::Unavailable => {}
        }
        log::info!("Shutting down playback director");

        if let Some(mut worker) = self.streaming.take() {
            worker.shutdown();
        }
        self.streaming_queue.clear();

        for instance in self.instances.drain(..) {
            instance.teardown(&mut self.voices, &*self.backend);
        }
        self.ambient.clear();
        self.music.clear();

        for voice in self.voices.drain() {
            self.backend.destroy_voice(voice);
        }

        if self.backend_open {
            self.backend_open = false;
            if let Err(e) = self.backend.close() {
                log::error!("Failed to close audio backend: {}", e);
            }
        }
        self.assets.release_audio_content();
        if let Err(e) = self.backend.unload() {
            log::error!("Failed to unload audio backend: {}", e);
        }

        self.state = DeviceState::ShutDown;
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn is_available(&self) -> bool {
        self.state == DeviceState::Available
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Mutes all output through the listener gain, applied on the next update.
    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    /// Number of voices obtained from the backend.
    pub fn max_voices(&self) -> usize {
        self.voices.capacity()
    }

    pub fn available_voices(&self) -> usize {
        self.voices.available()
    }

    pub fn playing_2d(&self) -> usize {
        self.counters.playing_2d()
    }

    pub fn playing_3d(&self) -> usize {
        self.counters.playing_3d()
    }

    /// Live instances, highest priority first as of the last update.
    pub fn instances(&self) -> &[Arc<SoundInstance>] {
        &self.instances
    }

    /// Designates the listener entity. `None` lets the entity provider pick one.
    pub fn set_listener(&mut self, entity: Option<EntityId>) {
        self.listener.designate(entity);
    }

    pub fn listener_entity(&self) -> Option<EntityId> {
        self.listener.entity()
    }

    /// Drains pending events.
    pub fn poll_events(&self) -> Vec<DirectorEvent> {
        self.event_rx.try_iter().collect()
    }

    /// Sender for environment changes, applied at the start of the next update.
    pub fn settings_notifier(&self) -> Sender<EnvironmentSettings> {
        self.settings_tx.clone()
    }

    pub fn environment(&self) -> EnvironmentSettings {
        self.environment
    }

    pub fn stats(&self) -> DirectorStats {
        self.stats
    }

    /// Budget queue for `category`, `None` for unbudgeted effects.
    pub fn budget(&self, category: SoundCategory) -> Option<&BudgetQueue<SoundInstance>> {
        match category {
            SoundCategory::Effect => None,
            SoundCategory::Ambient => Some(&self.ambient),
            SoundCategory::Music => Some(&self.music),
        }
    }

    /// Changes how many instances of `category` may be audible at once, applied on
    /// the next update. Ignored for unbudgeted effects.
    pub fn set_budget_cap(&mut self, category: SoundCategory, cap: usize) {
        if let Some(budget) = self.budget_mut(category) {
            log::debug!("{} budget cap set to {}", category, cap);
            budget.set_cap(cap);
        }
    }

    fn budget_mut(&mut self, category: SoundCategory) -> Option<&mut BudgetQueue<SoundInstance>> {
        match category {
            SoundCategory::Effect => None,
            SoundCategory::Ambient => Some(&mut self.ambient),
            SoundCategory::Music => Some(&mut self.music),
        }
    }

    /// Identity used for per-asset counting; runtime-only data is never counted.
    fn counting_key(&self, asset: &AssetRef) -> Option<String> {
        if self.assets.is_runtime_only(asset) {
            None
        } else {
            self.assets.stable_path(asset)
        }
    }
}

impl Drop for PlaybackDirector {
    fn drop(&mut self) {
        self.shutdown();
    }
}
