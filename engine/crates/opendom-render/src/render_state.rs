use ash::vk;
use opendom_gfx::{gfx::Gfx, swapchain::surface::GfxSurface};
use opendom_scene::{instance::Instance, mesh::MeshData};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use crate::{
    camera::CameraController,
    command_list::CommandLists,
    config::RendererConfig,
    entity_store::{EntityId, EntityStore, InstanceSlot, MeshBinding},
    frame_backend::SwapchainFrameBackend,
    frame_sync::{FrameOutcome, FrameSynchronizer, SkipReason, apply_frame_outcome},
    instance_sync::{GpuEntityBuffers, InstanceSyncer, SyncStatus},
    mesh_upload::MeshUploader,
    present_chain::PresentationChain,
    sync::frame_signals::FrameSignals,
    uniforms::{CameraBlock, GpuUniforms, InputSnapshot},
};

/// 渲染核心的全部状态，进程内只有一份
///
/// 驱动循环每帧依次调用 [`RenderState::set_input`]、[`RenderState::move_camera`]、[`RenderState::draw_frame`]
pub struct RenderState {
    config: RendererConfig,
    window_extent: vk::Extent2D,

    surface: GfxSurface,
    chain: PresentationChain,
    signals: FrameSignals,
    slot_images: Vec<Option<usize>>,
    command_lists: CommandLists,
    uniforms: GpuUniforms,

    store: EntityStore,
    entity_buffers: GpuEntityBuffers,
    mesh_uploader: MeshUploader,
    instance_syncer: InstanceSyncer,
    /// 最近一帧 instance 同步的结果
    last_sync_status: SyncStatus,

    frame_sync: FrameSynchronizer,
    camera_controller: CameraController,
    input: InputSnapshot,

    _tracy_client: tracy_client::Client,
}

// new & init
impl RenderState {
    /// 任何失败都属于配置错误：缺少 GPU 特性、无法 present、shader 不可读等
    pub fn init_graphics(
        config: RendererConfig,
        display_handle: RawDisplayHandle,
        window_handle: RawWindowHandle,
        window_extent: vk::Extent2D,
    ) -> anyhow::Result<Self> {
        let tracy_client = tracy_client::Client::start();
        let _span = tracy_client::span!("RenderState::init_graphics");

        let surface_exts = GfxSurface::required_instance_exts(display_handle)?;
        Gfx::init(&config.app_name, &surface_exts, config.enable_validation)?;

        let surface = GfxSurface::new(display_handle, window_handle)?;
        let mut uniforms = GpuUniforms::new()?;
        let chain = PresentationChain::create(&surface, &config, window_extent, &uniforms.bindings())?;
        uniforms.camera.update_projection(chain.extent());
        uniforms.flush()?;

        let signals = FrameSignals::new(chain.image_count(), config.max_swapchain_images)?;
        let slot_images = vec![None; chain.image_count()];

        let state = Self {
            window_extent,
            surface,
            signals,
            slot_images,
            command_lists: CommandLists::new()?,
            uniforms,
            chain,

            store: EntityStore::new(&config),
            entity_buffers: GpuEntityBuffers::new(),
            mesh_uploader: MeshUploader::new(&config)?,
            instance_syncer: InstanceSyncer::new()?,
            last_sync_status: SyncStatus::Complete,

            frame_sync: FrameSynchronizer::new(config.acquire_timeout_ns, config.image_fence_timeout_ns),
            camera_controller: CameraController::new(),
            input: InputSnapshot::default(),

            config,
            _tracy_client: tracy_client,
        };
        log::info!("graphics initialized on {}", Gfx::get().physical_device().device_name());
        Ok(state)
    }

    /// 等待 GPU 空闲后按创建的逆序释放所有资源
    pub fn destroy(mut self) -> anyhow::Result<()> {
        Gfx::get().wait_idle()?;
        self.instance_syncer.wait(u64::MAX)?;

        self.instance_syncer.destroy();
        self.mesh_uploader.destroy()?;
        self.entity_buffers.destroy();
        self.command_lists.destroy();
        self.signals.destroy();
        self.chain.destroy();
        self.uniforms.destroy();
        self.surface.destroy();

        Gfx::destroy();
        log::info!("graphics destroyed");
        Ok(())
    }
}

// getters
impl RenderState {
    #[inline]
    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    #[inline]
    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    #[inline]
    pub fn swapchain_extent(&self) -> vk::Extent2D {
        self.chain.extent()
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.chain.image_count()
    }

    #[inline]
    pub fn camera(&self) -> &CameraBlock {
        &self.uniforms.camera
    }

    /// StillInProgress 表示上一批 instance 更新仍在 GPU 上，本帧的修改要等之后的帧才能看到
    #[inline]
    pub fn last_sync_status(&self) -> SyncStatus {
        self.last_sync_status
    }

    /// 修改会在下一次 draw_frame 时写入 GPU
    #[inline]
    pub fn camera_mut(&mut self) -> &mut CameraBlock {
        &mut self.uniforms.camera
    }
}

// scene
impl RenderState {
    /// 上传网格并新建 entity definition，命令列表会在下一帧重新录制
    pub fn create_entity_definition(&mut self, mesh: &MeshData) -> anyhow::Result<EntityId> {
        let name = format!("entity-{}", self.store.len());
        let gpu_mesh = self.mesh_uploader.upload(mesh, &name)?;

        let entity = self.store.create_entity_definition(MeshBinding {
            vertex_count: gpu_mesh.vertex_count(),
        });
        self.entity_buffers.register(entity, gpu_mesh)?;

        log::info!("created {} with {} vertices", name, mesh.vertex_count());
        Ok(entity)
    }

    pub fn add_instance(&mut self, entity: EntityId, instance: Instance) -> anyhow::Result<InstanceSlot> {
        let (slot, instance_id) = self.store.add_instance(entity, instance)?;
        log::debug!("entity {} instance {:?} at slot {}", entity.0, instance_id, slot.0);
        Ok(slot)
    }

    /// 就地修改 instance，下一帧上传
    #[inline]
    pub fn instance_mut(&mut self, entity: EntityId, slot: InstanceSlot) -> anyhow::Result<&mut Instance> {
        self.store.instance_mut(entity, slot)
    }

    #[inline]
    pub fn set_selected(&mut self, entity: EntityId, slot: InstanceSlot, selected: bool) -> anyhow::Result<()> {
        self.store.set_selected(entity, slot, selected)
    }
}

// update
impl RenderState {
    #[inline]
    pub fn set_input(&mut self, input: InputSnapshot) {
        self.input = input;
    }

    /// 根据当前的输入移动相机
    #[inline]
    pub fn move_camera(&mut self) {
        self.camera_controller.update(&mut self.uniforms.camera.view, &self.input);
    }

    /// 窗口尺寸变化，下一帧重建交换链
    pub fn resize(&mut self, window_extent: vk::Extent2D) {
        if self.window_extent != window_extent {
            self.window_extent = window_extent;
            self.frame_sync.request_recreate();
        }
    }

    /// 一帧：输入 -> instance 同步 -> 按需重录命令 -> acquire/submit/present
    ///
    /// 交换链失效与各种超时都在内部处理，只有不可恢复的错误才会返回 Err
    pub fn draw_frame(&mut self) -> anyhow::Result<FrameOutcome> {
        let _span = tracy_client::span!("RenderState::draw_frame");

        if self.window_extent.width == 0 || self.window_extent.height == 0 {
            return Ok(FrameOutcome::Skipped(SkipReason::Minimized));
        }

        self.uniforms.input.apply_snapshot(&self.input, self.chain.extent());
        self.uniforms.flush()?;

        self.last_sync_status = self.instance_syncer.sync_dirty_instances(&mut self.store, &mut self.entity_buffers)?;
        if self.last_sync_status == SyncStatus::StillInProgress {
            log::debug!("previous instance sync still in flight");
        }

        if self.store.command_list_dirty() {
            self.command_lists.rebuild(&self.chain, &self.store, &self.entity_buffers)?;
            self.store.clear_command_list_dirty();
        }

        let mut backend = SwapchainFrameBackend {
            surface: &self.surface,
            config: &self.config,
            window_extent: self.window_extent,
            chain: &mut self.chain,
            signals: &mut self.signals,
            slot_images: &mut self.slot_images,
            command_lists: &self.command_lists,
            uniforms: &mut self.uniforms,
        };
        let outcome = self.frame_sync.run_frame(&mut backend)?;
        apply_frame_outcome(&mut self.store, outcome);

        tracy_client::frame_mark();
        Ok(outcome)
    }
}
