//! In-memory collaborators for unit tests.

use crate::assets::{AssetProvider, AssetRef, AudioStream};
use crate::backend::{
    AudioBackend, BackendInfo, ListenerParams, VoiceHandle, VoiceParams, VoiceSource,
};
use crate::config::EnvironmentSettings;
use crate::error::{PetalSonicError, Result};
use crate::spatial::{EntityId, EntityTransform, SpatialEntityProvider};
use crossbeam_channel::{Receiver, Sender};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// How a voice was last started: `Some((asset, offset))` for resident playback.
pub type VoiceStart = Option<(AssetRef, usize)>;

#[derive(Default)]
struct FakeBackendState {
    created: usize,
    destroyed: Vec<VoiceHandle>,
    playing: HashSet<VoiceHandle>,
    offsets: HashMap<VoiceHandle, usize>,
    starts: HashMap<VoiceHandle, VoiceStart>,
    params: HashMap<VoiceHandle, VoiceParams>,
    queued: HashMap<VoiceHandle, usize>,
    received: HashMap<VoiceHandle, usize>,
    listener: Option<ListenerParams>,
    environment: Option<EnvironmentSettings>,
    closed: usize,
    unloaded: usize,
}

/// Backend with a fixed number of voices that records every call.
pub struct FakeBackend {
    max_voices: usize,
    fail_open: bool,
    state: Mutex<FakeBackendState>,
}

impl FakeBackend {
    pub fn with_voices(max_voices: usize) -> Self {
        Self {
            max_voices,
            fail_open: false,
            state: Mutex::new(FakeBackendState::default()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_open: true,
            ..Self::with_voices(0)
        }
    }

    pub fn created_voices(&self) -> usize {
        self.state.lock().unwrap().created
    }

    pub fn destroyed_voices(&self) -> Vec<VoiceHandle> {
        self.state.lock().unwrap().destroyed.clone()
    }

    pub fn listener(&self) -> Option<ListenerParams> {
        self.state.lock().unwrap().listener
    }

    pub fn environment(&self) -> Option<EnvironmentSettings> {
        self.state.lock().unwrap().environment
    }

    pub fn voice_params(&self, voice: VoiceHandle) -> Option<VoiceParams> {
        self.state.lock().unwrap().params.get(&voice).copied()
    }

    pub fn last_start(&self, voice: VoiceHandle) -> Option<VoiceStart> {
        self.state.lock().unwrap().starts.get(&voice).cloned()
    }

    pub fn playing_voices(&self) -> usize {
        self.state.lock().unwrap().playing.len()
    }

    /// Simulates the voice reaching the end of its data.
    pub fn finish_voice(&self, voice: VoiceHandle) {
        let mut state = self.state.lock().unwrap();
        state.playing.remove(&voice);
        state.queued.insert(voice, 0);
    }

    pub fn set_offset(&self, voice: VoiceHandle, frames: usize) {
        self.state.lock().unwrap().offsets.insert(voice, frames);
    }

    /// Total buffers ever queued on the voice.
    pub fn buffers_received(&self, voice: VoiceHandle) -> usize {
        self.state
            .lock()
            .unwrap()
            .received
            .get(&voice)
            .copied()
            .unwrap_or(0)
    }

    /// Marks every queued buffer on the voice as played.
    pub fn consume_buffers(&self, voice: VoiceHandle) {
        self.state.lock().unwrap().queued.insert(voice, 0);
    }

    pub fn closed(&self) -> usize {
        self.state.lock().unwrap().closed
    }

    pub fn unloaded(&self) -> usize {
        self.state.lock().unwrap().unloaded
    }
}

impl AudioBackend for FakeBackend {
    fn open(&self) -> Result<BackendInfo> {
        if self.fail_open {
            return Err(PetalSonicError::Backend("No output device".into()));
        }
        Ok(BackendInfo {
            device_name: "fake".into(),
        })
    }

    fn create_voice(&self) -> Result<VoiceHandle> {
        let mut state = self.state.lock().unwrap();
        if state.created >= self.max_voices {
            return Err(PetalSonicError::VoiceAllocation("Out of voices".into()));
        }
        state.created += 1;
        Ok(VoiceHandle::new(state.created as u32))
    }

    fn destroy_voice(&self, voice: VoiceHandle) {
        self.state.lock().unwrap().destroyed.push(voice);
    }

    fn set_voice_params(&self, voice: VoiceHandle, params: &VoiceParams) {
        self.state.lock().unwrap().params.insert(voice, *params);
    }

    fn start_voice(&self, voice: VoiceHandle, source: VoiceSource<'_>) {
        let mut state = self.state.lock().unwrap();
        state.playing.insert(voice);
        state.offsets.insert(voice, 0);
        let start = match source {
            VoiceSource::Resident { asset, offset } => Some((asset.clone(), offset)),
            VoiceSource::Streamed => None,
        };
        state.starts.insert(voice, start);
    }

    fn stop_voice(&self, voice: VoiceHandle) {
        let mut state = self.state.lock().unwrap();
        state.playing.remove(&voice);
        state.queued.insert(voice, 0);
    }

    fn is_voice_playing(&self, voice: VoiceHandle) -> bool {
        self.state.lock().unwrap().playing.contains(&voice)
    }

    fn voice_offset(&self, voice: VoiceHandle) -> usize {
        self.state
            .lock()
            .unwrap()
            .offsets
            .get(&voice)
            .copied()
            .unwrap_or(0)
    }

    fn queue_buffer(&self, voice: VoiceHandle, _samples: &[f32]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        *state.queued.entry(voice).or_insert(0) += 1;
        *state.received.entry(voice).or_insert(0) += 1;
        Ok(())
    }

    fn queued_buffers(&self, voice: VoiceHandle) -> usize {
        self.state
            .lock()
            .unwrap()
            .queued
            .get(&voice)
            .copied()
            .unwrap_or(0)
    }

    fn set_listener(&self, params: &ListenerParams) {
        self.state.lock().unwrap().listener = Some(*params);
    }

    fn set_environment(&self, settings: &EnvironmentSettings) {
        self.state.lock().unwrap().environment = Some(*settings);
    }

    fn close(&self) -> Result<()> {
        self.state.lock().unwrap().closed += 1;
        Ok(())
    }

    fn unload(&self) -> Result<()> {
        self.state.lock().unwrap().unloaded += 1;
        Ok(())
    }
}

/// How a fake streamed asset behaves.
#[derive(Clone, Default)]
struct StreamSpec {
    chunks: usize,
    fail_read: bool,
    fail_rewind: bool,
    gate: Option<StreamGate>,
}

#[derive(Clone)]
struct FakeAsset {
    available: bool,
    runtime_only: bool,
    stream: Option<StreamSpec>,
}

impl FakeAsset {
    fn resident() -> Self {
        Self {
            available: true,
            runtime_only: false,
            stream: None,
        }
    }

    fn streamed(spec: StreamSpec) -> Self {
        Self {
            stream: Some(spec),
            ..Self::resident()
        }
    }
}

/// Asset provider backed by a name table. Stable paths are `sounds/<name>`.
#[derive(Default)]
pub struct FakeAssets {
    assets: Mutex<HashMap<String, FakeAsset>>,
    released: AtomicUsize,
}

impl FakeAssets {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, name: &str, asset: FakeAsset) -> AssetRef {
        self.assets.lock().unwrap().insert(name.to_owned(), asset);
        AssetRef::new(name)
    }

    pub fn add(&self, name: &str) -> AssetRef {
        self.insert(name, FakeAsset::resident())
    }

    pub fn add_runtime(&self, name: &str) -> AssetRef {
        self.insert(
            name,
            FakeAsset {
                runtime_only: true,
                ..FakeAsset::resident()
            },
        )
    }

    pub fn add_unavailable(&self, name: &str) -> AssetRef {
        self.insert(
            name,
            FakeAsset {
                available: false,
                ..FakeAsset::resident()
            },
        )
    }

    /// Streamed asset producing `chunks` non-empty reads before ending.
    pub fn add_streamed(&self, name: &str, chunks: usize) -> AssetRef {
        self.insert(
            name,
            FakeAsset::streamed(StreamSpec {
                chunks,
                ..StreamSpec::default()
            }),
        )
    }

    /// Streamed asset whose decoder fails on the first read.
    pub fn add_corrupt(&self, name: &str) -> AssetRef {
        self.insert(
            name,
            FakeAsset::streamed(StreamSpec {
                chunks: 1,
                fail_read: true,
                ..StreamSpec::default()
            }),
        )
    }

    /// Streamed asset whose decoder cannot seek back to the start.
    pub fn add_unrewindable(&self, name: &str, chunks: usize) -> AssetRef {
        self.insert(
            name,
            FakeAsset::streamed(StreamSpec {
                chunks,
                fail_rewind: true,
                ..StreamSpec::default()
            }),
        )
    }

    /// Streamed asset whose reads block until the returned gate is opened.
    pub fn add_gated(&self, name: &str, chunks: usize) -> (AssetRef, StreamGate) {
        let gate = StreamGate::new();
        let asset = self.insert(
            name,
            FakeAsset::streamed(StreamSpec {
                chunks,
                gate: Some(gate.clone()),
                ..StreamSpec::default()
            }),
        );
        (asset, gate)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    fn get(&self, asset: &AssetRef) -> Option<FakeAsset> {
        self.assets.lock().unwrap().get(asset.name()).cloned()
    }
}

impl AssetProvider for FakeAssets {
    fn is_available(&self, asset: &AssetRef) -> bool {
        self.get(asset).is_some_and(|a| a.available)
    }

    fn is_runtime_only(&self, asset: &AssetRef) -> bool {
        self.get(asset).is_some_and(|a| a.runtime_only)
    }

    fn stable_path(&self, asset: &AssetRef) -> Option<String> {
        self.get(asset).map(|_| format!("sounds/{}", asset))
    }

    fn open_stream(&self, asset: &AssetRef) -> Result<Option<Box<dyn AudioStream>>> {
        Ok(self
            .get(asset)
            .and_then(|a| a.stream)
            .map(|spec| Box::new(FakeStream::new(spec)) as Box<dyn AudioStream>))
    }

    fn release_audio_content(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Holds stream reads until [`open`](Self::open) is called.
#[derive(Clone)]
pub struct StreamGate {
    sender: Arc<Mutex<Option<Sender<()>>>>,
    receiver: Receiver<()>,
    reads: Arc<AtomicUsize>,
}

impl StreamGate {
    fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::bounded(0);
        Self {
            sender: Arc::new(Mutex::new(Some(sender))),
            receiver,
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Releases every blocked and future read.
    pub fn open(&self) {
        self.sender.lock().unwrap().take();
    }

    /// Number of reads that have started, including blocked ones.
    pub fn reads_started(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn pass(&self) {
        self.reads.fetch_add(1, Ordering::SeqCst);
        // Nothing is ever sent; returns once the sender is dropped
        let _ = self.receiver.recv();
    }
}

/// Stream yielding a fixed number of full chunks of silence.
struct FakeStream {
    spec: StreamSpec,
    remaining: usize,
}

impl FakeStream {
    fn new(spec: StreamSpec) -> Self {
        Self {
            remaining: spec.chunks,
            spec,
        }
    }
}

impl AudioStream for FakeStream {
    fn read(&mut self, out: &mut [f32]) -> Result<usize> {
        if let Some(gate) = &self.spec.gate {
            gate.pass();
        }
        if self.spec.fail_read {
            return Err(PetalSonicError::Decode("Corrupt frame header".into()));
        }
        if self.remaining == 0 {
            return Ok(0);
        }
        self.remaining -= 1;
        out.fill(0.0);
        Ok(out.len())
    }

    fn rewind(&mut self) -> Result<()> {
        if self.spec.fail_rewind {
            return Err(std::io::Error::from(std::io::ErrorKind::Unsupported).into());
        }
        self.remaining = self.spec.chunks;
        Ok(())
    }
}

/// Scene with settable entity transforms.
#[derive(Default)]
pub struct FakeEntities {
    transforms: Mutex<HashMap<EntityId, EntityTransform>>,
    listener_candidate: Mutex<Option<EntityId>>,
    next_id: AtomicU64,
}

impl FakeEntities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&self, transform: EntityTransform) -> EntityId {
        let id = EntityId::new(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.transforms.lock().unwrap().insert(id, transform);
        id
    }

    pub fn despawn(&self, entity: EntityId) {
        self.transforms.lock().unwrap().remove(&entity);
    }

    pub fn set_transform(&self, entity: EntityId, transform: EntityTransform) {
        self.transforms.lock().unwrap().insert(entity, transform);
    }

    pub fn set_listener_candidate(&self, entity: Option<EntityId>) {
        *self.listener_candidate.lock().unwrap() = entity;
    }
}

impl SpatialEntityProvider for FakeEntities {
    fn transform(&self, entity: EntityId) -> Option<EntityTransform> {
        self.transforms.lock().unwrap().get(&entity).copied()
    }

    fn find_listener(&self) -> Option<EntityId> {
        *self.listener_candidate.lock().unwrap()
    }
}
