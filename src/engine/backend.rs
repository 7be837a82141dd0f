// src/engine/backend.rs
//
// Backend context capability. Texture-resident images hold a BackendContext
// and reach pixels only through the Backend trait. HostBackend keeps its
// "device" memory in process and runs submitted work on the engine pool.

use crate::engine::color::ImageInfo;
use crate::engine::geometry::{IRect, ISize};
use crate::engine::pixmap::Pixmap;
use crate::engine::pool;
use crate::error::ImageError;
use crate::ops::Mipmapped;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

type BackendResult<T> = std::result::Result<T, ImageError>;

pub type TextureId = u64;

/// Work queued on a backend. It is called exactly once: with `Err` when the
/// backend refuses the job, `Ok(())` when it runs.
pub type BackendJob = Box<dyn FnOnce(BackendResult<()>) + Send + 'static>;

pub trait Backend: Send + Sync + fmt::Debug {
    fn context_id(&self) -> u64;
    fn is_abandoned(&self) -> bool;
    /// Tear down the device. Resident textures are lost.
    fn abandon(&self);

    fn upload(&self, pixmap: &Pixmap, mipmapped: Mipmapped) -> BackendResult<TextureId>;
    fn texture_dimensions(&self, texture: TextureId) -> Option<ISize>;
    /// Read `src_rect` of `texture` into `dst`, converting to `dst_info`.
    fn read_texture(
        &self,
        texture: TextureId,
        src_rect: &IRect,
        dst_info: &ImageInfo,
        dst: &mut [u8],
        dst_row_bytes: usize,
    ) -> BackendResult<()>;
    /// Produce a new resident texture holding `src_rect` converted to `dst_info`.
    fn convert_texture(
        &self,
        texture: TextureId,
        src_rect: &IRect,
        dst_info: &ImageInfo,
    ) -> BackendResult<TextureId>;
    fn release_texture(&self, texture: TextureId);
    fn submit(&self, job: BackendJob);
    fn resident_textures(&self) -> usize;
}

/// Shared handle to a backend. Two handles match when they name the same
/// device context.
#[derive(Clone)]
pub struct BackendContext(Arc<dyn Backend>);

impl BackendContext {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self(backend)
    }

    /// A fresh in-process backend.
    pub fn host() -> Self {
        Self(Arc::new(HostBackend::new()))
    }

    pub fn id(&self) -> u64 {
        self.0.context_id()
    }

    pub fn matches(&self, other: Option<&BackendContext>) -> bool {
        other.is_some_and(|o| o.id() == self.id())
    }

    pub fn abandoned(&self) -> bool {
        self.0.is_abandoned()
    }

    pub fn backend(&self) -> &dyn Backend {
        self.0.as_ref()
    }

    /// Reject work on a torn-down device.
    pub fn check_alive(&self) -> BackendResult<()> {
        if self.abandoned() {
            warn!(context = self.id(), "backend abandoned");
            return Err(ImageError::backend_abandoned(self.id()));
        }
        Ok(())
    }
}

impl PartialEq for BackendContext {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for BackendContext {}

impl fmt::Debug for BackendContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendContext")
            .field("id", &self.id())
            .field("abandoned", &self.abandoned())
            .finish()
    }
}

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
pub struct HostBackend {
    id: u64,
    abandoned: AtomicBool,
    textures: RwLock<HashMap<TextureId, Pixmap>>,
    next_texture: AtomicU64,
}

impl HostBackend {
    pub fn new() -> Self {
        Self {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            abandoned: AtomicBool::new(false),
            textures: RwLock::new(HashMap::new()),
            next_texture: AtomicU64::new(1),
        }
    }

    fn alive(&self) -> BackendResult<()> {
        if self.is_abandoned() {
            return Err(ImageError::backend_abandoned(self.id));
        }
        Ok(())
    }

    fn texture(&self, texture: TextureId) -> BackendResult<Pixmap> {
        self.alive()?;
        self.textures
            .read()
            .get(&texture)
            .cloned()
            .ok_or_else(|| ImageError::read_pixels_failed(format!("unknown texture {texture}")))
    }

    fn insert(&self, pixmap: Pixmap) -> TextureId {
        let id = self.next_texture.fetch_add(1, Ordering::Relaxed);
        self.textures.write().insert(id, pixmap);
        id
    }
}

impl Default for HostBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for HostBackend {
    fn context_id(&self) -> u64 {
        self.id
    }

    fn is_abandoned(&self) -> bool {
        self.abandoned.load(Ordering::Acquire)
    }

    fn abandon(&self) {
        self.abandoned.store(true, Ordering::Release);
        self.textures.write().clear();
        debug!(context = self.id, "host backend abandoned");
    }

    fn upload(&self, pixmap: &Pixmap, _mipmapped: Mipmapped) -> BackendResult<TextureId> {
        self.alive()?;
        // device memory never aliases caller pixels
        let copy = pixmap.copy_as(pixmap.info())?;
        Ok(self.insert(copy))
    }

    fn texture_dimensions(&self, texture: TextureId) -> Option<ISize> {
        self.textures.read().get(&texture).map(|p| p.info().dimensions())
    }

    fn read_texture(
        &self,
        texture: TextureId,
        src_rect: &IRect,
        dst_info: &ImageInfo,
        dst: &mut [u8],
        dst_row_bytes: usize,
    ) -> BackendResult<()> {
        let pixmap = self.texture(texture)?;
        let view = pixmap.extract_subset(src_rect).ok_or_else(|| {
            ImageError::invalid_subset(src_rect.ltrb(), pixmap.width(), pixmap.height())
        })?;
        view.read_pixels(dst_info, dst, dst_row_bytes, 0, 0)
    }

    fn convert_texture(
        &self,
        texture: TextureId,
        src_rect: &IRect,
        dst_info: &ImageInfo,
    ) -> BackendResult<TextureId> {
        let pixmap = self.texture(texture)?;
        let view = pixmap.extract_subset(src_rect).ok_or_else(|| {
            ImageError::invalid_subset(src_rect.ltrb(), pixmap.width(), pixmap.height())
        })?;
        let converted = view.copy_as(dst_info)?;
        Ok(self.insert(converted))
    }

    fn release_texture(&self, texture: TextureId) {
        self.textures.write().remove(&texture);
    }

    fn submit(&self, job: BackendJob) {
        if let Err(err) = self.alive() {
            job(Err(err));
            return;
        }
        pool::spawn(move || job(Ok(())));
    }

    fn resident_textures(&self) -> usize {
        self.textures.read().len()
    }
}
