use super::{
    DEFAULT_MAX_DISTANCE, DEFAULT_MIN_DISTANCE, Emitter, InstanceId, LoopMode, PlayCounters,
    PlayState,
};
use crate::assets::{AssetRef, AudioStream};
use crate::backend::{AudioBackend, VoiceHandle, VoiceParams, VoiceSource};
use crate::budget::{BudgetMember, SoundCategory};
use crate::config::PlayParams;
use crate::events::DirectorEvent;
use crate::math::{Vec3, to_backend_axes};
use crate::spatial::SpatialEntityProvider;
use crate::streaming::{StreamStatus, StreamingQueue, StreamingTask};
use crate::voice_pool::VoicePool;
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Everything an instance may touch while the director advances it.
pub(crate) struct InstanceContext<'a> {
    pub voices: &'a mut VoicePool,
    pub backend: &'a dyn AudioBackend,
    pub entities: &'a dyn SpatialEntityProvider,
    pub streaming: &'a StreamingQueue,
    pub events: &'a Sender<DirectorEvent>,
}

/// Construction parameters for a live instance.
pub(crate) struct InstanceSetup {
    pub asset: AssetRef,
    pub emitter: Emitter,
    pub params: PlayParams,
    pub stream: Option<Box<dyn AudioStream>>,
    pub counters: Arc<PlayCounters>,
    /// Stable asset identity, `None` for runtime-only data
    pub counting_key: Option<String>,
    pub chunk_samples: usize,
    pub max_queued_buffers: usize,
}

struct Tracking {
    counters: Arc<PlayCounters>,
    key: Option<String>,
}

struct InstanceState {
    play_state: PlayState,
    loop_mode: LoopMode,
    volume: f32,
    position: Vec3,
    voice: Option<VoiceHandle>,
    /// Frames into the asset to restart a resident voice from
    resume_offset: usize,
    starved: bool,
    streamed: bool,
    stream: Option<Box<dyn AudioStream>>,
    scratch: Vec<f32>,
    /// Samples decoded into `scratch` but not yet queued on a voice
    pending: usize,
    max_queued_buffers: usize,
    end_of_stream: bool,
    /// Set after a rewind until the next non-empty read
    rewound: bool,
}

/// One in-flight playback request.
///
/// Shared as `Arc<SoundInstance>` between the director, the streaming worker and the
/// caller. The caller controls it through [`stop`](Self::stop), [`pause`](Self::pause),
/// volume/priority setters and queries; voices are only ever leased and returned by
/// the director's update.
pub struct SoundInstance {
    id: InstanceId,
    asset: AssetRef,
    category: SoundCategory,
    emitter: Emitter,
    priority: AtomicI32,
    disposed: AtomicBool,
    suspended: AtomicBool,
    tracking: Option<Tracking>,
    state: Mutex<InstanceState>,
}

impl SoundInstance {
    /// Creates a live instance and registers it with the playback counters.
    pub(crate) fn new(setup: InstanceSetup) -> Arc<Self> {
        let is_3d = setup.emitter.is_spatial();
        setup.counters.register(setup.counting_key.as_deref(), is_3d);

        let streamed = setup.stream.is_some();
        Arc::new(Self {
            id: InstanceId::generate(),
            asset: setup.asset,
            category: setup.params.category,
            emitter: setup.emitter,
            priority: AtomicI32::new(setup.params.priority),
            disposed: AtomicBool::new(false),
            suspended: AtomicBool::new(false),
            tracking: Some(Tracking {
                counters: setup.counters,
                key: setup.counting_key,
            }),
            state: Mutex::new(InstanceState {
                play_state: PlayState::Playing,
                loop_mode: setup.params.loop_mode,
                volume: setup.params.volume,
                position: setup.emitter.initial_position(),
                voice: None,
                resume_offset: 0,
                starved: false,
                streamed,
                stream: setup.stream,
                scratch: if streamed {
                    vec![0.0; setup.chunk_samples]
                } else {
                    Vec::new()
                },
                pending: 0,
                max_queued_buffers: setup.max_queued_buffers,
                end_of_stream: false,
                rewound: false,
            }),
        })
    }

    /// Creates an instance that never produces sound. It is disposed from the start,
    /// never counted and never streamed.
    pub(crate) fn silent(asset: AssetRef, emitter: Emitter, params: PlayParams) -> Arc<Self> {
        Arc::new(Self {
            id: InstanceId::generate(),
            asset,
            category: params.category,
            emitter,
            priority: AtomicI32::new(params.priority),
            disposed: AtomicBool::new(true),
            suspended: AtomicBool::new(false),
            tracking: None,
            state: Mutex::new(InstanceState {
                play_state: PlayState::Stopped,
                loop_mode: params.loop_mode,
                volume: params.volume,
                position: emitter.initial_position(),
                voice: None,
                resume_offset: 0,
                starved: false,
                streamed: false,
                stream: None,
                scratch: Vec::new(),
                pending: 0,
                max_queued_buffers: 0,
                end_of_stream: true,
                rewound: false,
            }),
        })
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn asset(&self) -> &AssetRef {
        &self.asset
    }

    pub fn category(&self) -> SoundCategory {
        self.category
    }

    pub fn emitter(&self) -> Emitter {
        self.emitter
    }

    pub fn is_3d(&self) -> bool {
        self.emitter.is_spatial()
    }

    pub fn priority(&self) -> i32 {
        self.priority.load(Ordering::Relaxed)
    }

    /// Changes the priority; the director re-ranks on its next update.
    pub fn set_priority(&self, priority: i32) {
        self.priority.store(priority, Ordering::Relaxed);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Whether a playback budget is currently holding this instance back.
    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::Relaxed)
    }

    pub fn play_state(&self) -> PlayState {
        self.lock_state().play_state
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.lock_state().loop_mode
    }

    pub fn volume(&self) -> f32 {
        self.lock_state().volume
    }

    pub fn set_volume(&self, volume: f32) {
        self.lock_state().volume = volume.max(0.0);
    }

    /// World position as of the last update (zero for non-spatial instances).
    pub fn position(&self) -> Vec3 {
        self.lock_state().position
    }

    /// Moves a positional instance. Attached instances are moved back onto their
    /// entity on the next update.
    pub fn set_position(&self, position: Vec3) {
        if self.emitter.is_spatial() {
            self.lock_state().position = position;
        }
    }

    pub fn voice(&self) -> Option<VoiceHandle> {
        self.lock_state().voice
    }

    pub fn has_voice(&self) -> bool {
        self.voice().is_some()
    }

    pub fn requires_streaming(&self) -> bool {
        self.lock_state().streamed
    }

    /// Stops playback for good. The voice is returned on the director's next update.
    pub fn stop(&self) {
        self.lock_state().play_state = PlayState::Stopped;
        self.dispose();
    }

    /// Pauses playback, keeping the position so [`resume`](Self::resume) continues
    /// where it left off.
    ///
    /// Streamed instances resume from the decoder position. Buffers already queued on
    /// the released voice are discarded with it, so up to `max_queued_buffers` chunks
    /// are skipped.
    pub fn pause(&self) {
        let mut state = self.lock_state();
        if state.play_state == PlayState::Playing {
            state.play_state = PlayState::Paused;
        }
    }

    pub fn resume(&self) {
        let mut state = self.lock_state();
        if state.play_state == PlayState::Paused {
            state.play_state = PlayState::Playing;
        }
    }

    /// Whether the next update would lease a voice for this instance.
    pub(crate) fn wants_voice(&self) -> bool {
        if self.is_disposed() || self.is_suspended() {
            return false;
        }
        let state = self.lock_state();
        state.voice.is_none() && state.play_state == PlayState::Playing
    }

    /// Runs one tick: refreshes the position, leases or returns a voice, pushes voice
    /// parameters and detects the end of playback.
    pub(crate) fn advance(self: &Arc<Self>, ctx: &mut InstanceContext<'_>) {
        let mut state = self.lock_state();
        if self.is_disposed() {
            self.release_voice(&mut state, ctx.voices, ctx.backend);
            return;
        }

        if let Emitter::Attached { entity, offset } = self.emitter {
            match ctx.entities.transform(entity) {
                Some(transform) => state.position = transform.pose.transform_point(offset),
                None => log::trace!("{} lost {}, keeping last position", self.id, entity),
            }
        }

        if self.is_suspended() || state.play_state != PlayState::Playing {
            if let Some(voice) = state.voice {
                state.resume_offset += ctx.backend.voice_offset(voice);
                self.release_voice(&mut state, ctx.voices, ctx.backend);
            }
            return;
        }

        let Some(voice) = state.voice else {
            self.start_on_free_voice(&mut state, ctx);
            return;
        };

        ctx.backend.set_voice_params(voice, &self.voice_params(&state));
        if state.streamed && !state.end_of_stream {
            // No-op while queued; recovers a task the worker dropped during a voice change
            let task: Arc<dyn StreamingTask> = self.clone();
            ctx.streaming.enqueue(task);
        }
        if ctx.backend.is_voice_playing(voice) {
            return;
        }

        if !state.streamed || state.end_of_stream {
            self.finish(&mut state, ctx);
        } else if ctx.backend.queued_buffers(voice) > 0 {
            // Underrun: the worker caught up again
            log::debug!("{} recovered from a streaming underrun", self.id);
            ctx.backend.start_voice(voice, VoiceSource::Streamed);
        }
    }

    /// Takes the voice away for a higher-priority instance and disposes this one.
    pub(crate) fn evict(&self, voices: &mut VoicePool, backend: &dyn AudioBackend) {
        let mut state = self.lock_state();
        state.play_state = PlayState::Stopped;
        self.release_voice(&mut state, voices, backend);
        drop(state);
        self.dispose();
    }

    /// Returns the voice of a disposed instance to the pool.
    pub(crate) fn teardown(&self, voices: &mut VoicePool, backend: &dyn AudioBackend) {
        let mut state = self.lock_state();
        state.play_state = PlayState::Stopped;
        state.stream = None;
        self.release_voice(&mut state, voices, backend);
        drop(state);
        self.dispose();
    }

    fn start_on_free_voice(
        self: &Arc<Self>,
        state: &mut InstanceState,
        ctx: &mut InstanceContext<'_>,
    ) {
        let Some(voice) = ctx.voices.acquire() else {
            if !state.starved {
                state.starved = true;
                log::debug!("{} is waiting for a free voice", self.id);
                let _ = ctx
                    .events
                    .send(DirectorEvent::VoiceStarved { instance: self.id });
            }
            return;
        };

        state.starved = false;
        state.voice = Some(voice);
        ctx.backend.set_voice_params(voice, &self.voice_params(state));

        if state.streamed {
            ctx.backend.start_voice(voice, VoiceSource::Streamed);
            let task: Arc<dyn StreamingTask> = self.clone();
            ctx.streaming.enqueue(task);
        } else {
            ctx.backend.start_voice(
                voice,
                VoiceSource::Resident {
                    asset: &self.asset,
                    offset: state.resume_offset,
                },
            );
        }

        log::trace!("{} started on {}", self.id, voice);
        let _ = ctx.events.send(DirectorEvent::InstanceStarted {
            instance: self.id,
            voice,
        });
    }

    fn finish(&self, state: &mut InstanceState, ctx: &mut InstanceContext<'_>) {
        state.play_state = PlayState::Stopped;
        self.release_voice(state, ctx.voices, ctx.backend);
        self.dispose();
        log::trace!("{} finished", self.id);
        let _ = ctx
            .events
            .send(DirectorEvent::InstanceFinished { instance: self.id });
    }

    fn release_voice(
        &self,
        state: &mut InstanceState,
        voices: &mut VoicePool,
        backend: &dyn AudioBackend,
    ) {
        if let Some(voice) = state.voice.take() {
            backend.stop_voice(voice);
            voices.release(voice);
        }
    }

    fn voice_params(&self, state: &InstanceState) -> VoiceParams {
        VoiceParams {
            gain: state.volume,
            position: to_backend_axes(state.position),
            relative: !self.emitter.is_spatial(),
            min_distance: DEFAULT_MIN_DISTANCE,
            max_distance: DEFAULT_MAX_DISTANCE,
            looping: state.loop_mode == LoopMode::Infinite && !state.streamed,
        }
    }

    /// Marks the instance disposed and unregisters it, once.
    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(tracking) = &self.tracking {
            tracking
                .counters
                .unregister(tracking.key.as_deref(), self.emitter.is_spatial());
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, InstanceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for SoundInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoundInstance")
            .field("id", &self.id)
            .field("asset", &self.asset)
            .field("category", &self.category)
            .field("priority", &self.priority())
            .field("disposed", &self.is_disposed())
            .field("suspended", &self.is_suspended())
            .finish()
    }
}

impl BudgetMember for SoundInstance {
    fn priority(&self) -> i32 {
        SoundInstance::priority(self)
    }

    fn set_priority(&self, priority: i32) {
        SoundInstance::set_priority(self, priority);
    }

    fn is_disposed(&self) -> bool {
        SoundInstance::is_disposed(self)
    }

    fn set_suspended(&self, suspended: bool) {
        self.suspended.store(suspended, Ordering::Relaxed);
    }
}

impl StreamingTask for SoundInstance {
    fn task_id(&self) -> InstanceId {
        self.id
    }

    /// Tops up the voice's buffer queue.
    ///
    /// Decoding runs without the instance lock held. The chunk goes to whatever voice
    /// the instance holds once decoding is done; without one it is kept for the next
    /// lease.
    fn service(&self, backend: &dyn AudioBackend) -> StreamStatus {
        loop {
            let (voice, mut stream, mut scratch, looping, rewound) = {
                let mut state = self.lock_state();
                if self.is_disposed() || self.is_suspended() || state.end_of_stream {
                    return StreamStatus::Finished;
                }
                let Some(voice) = state.voice else {
                    return StreamStatus::Finished;
                };
                if backend.queued_buffers(voice) >= state.max_queued_buffers {
                    return StreamStatus::Pending;
                }
                if state.pending > 0 {
                    let n = state.pending;
                    if let Err(e) = backend.queue_buffer(voice, &state.scratch[..n]) {
                        log::warn!("Failed to queue buffer on {}: {}", voice, e);
                        return StreamStatus::Pending;
                    }
                    state.pending = 0;
                    continue;
                }
                let Some(stream) = state.stream.take() else {
                    return StreamStatus::Finished;
                };
                let scratch = std::mem::take(&mut state.scratch);
                (
                    voice,
                    stream,
                    scratch,
                    state.loop_mode == LoopMode::Infinite,
                    state.rewound,
                )
            };

            let read = stream.read(&mut scratch);
            let rewind = match read {
                Ok(0) if looping && !rewound => Some(stream.rewind()),
                _ => None,
            };

            let mut state = self.lock_state();
            let outcome = if self.is_disposed() {
                Some(StreamStatus::Finished)
            } else {
                match (read, rewind) {
                    (_, Some(Ok(()))) => {
                        state.rewound = true;
                        None
                    }
                    (_, Some(Err(e))) => {
                        log::warn!("Failed to rewind stream for {}: {}", self.id, e);
                        state.end_of_stream = true;
                        Some(StreamStatus::Finished)
                    }
                    (Ok(0), None) => {
                        state.end_of_stream = true;
                        Some(StreamStatus::Finished)
                    }
                    (Ok(n), None) => {
                        state.rewound = false;
                        let n = n.min(scratch.len());
                        match state.voice {
                            // Voice was returned while decoding; the next lease re-enqueues us
                            None => {
                                state.pending = n;
                                Some(StreamStatus::Finished)
                            }
                            Some(current) => {
                                if current != voice {
                                    log::debug!(
                                        "{} moved from {} to {} while decoding",
                                        self.id,
                                        voice,
                                        current
                                    );
                                }
                                match backend.queue_buffer(current, &scratch[..n]) {
                                    Ok(()) => None,
                                    Err(e) => {
                                        log::warn!("Failed to queue buffer on {}: {}", current, e);
                                        state.pending = n;
                                        Some(StreamStatus::Pending)
                                    }
                                }
                            }
                        }
                    }
                    (Err(e), None) => {
                        log::warn!("Stream decode failed for {}: {}", self.id, e);
                        state.end_of_stream = true;
                        Some(StreamStatus::Finished)
                    }
                }
            };
            state.stream = Some(stream);
            state.scratch = scratch;

            if let Some(status) = outcome {
                return status;
            }
        }
    }
}
