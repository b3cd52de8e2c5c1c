use ash::vk;
use opendom_gfx::{
    commands::{
        barrier::GfxMemoryBarrier, command_buffer::GfxCommandBuffer, command_pool::GfxCommandPool, fence::GfxFence,
        submit_info::GfxSubmitInfo,
    },
    gfx::Gfx,
    resources::buffer::GfxBuffer,
};
use opendom_scene::instance::Instance;

use crate::{
    entity_store::{EntityId, EntityStore, InstanceUploadSink, SyncReport},
    mesh_upload::GpuMesh,
    sync::gpu_token::{CompletionFence, GpuToken, TokenState},
};

/// `VkDrawIndirectCommand` 的大小
pub const DRAW_ARGS_SIZE: vk::DeviceSize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// 没有需要上传的数据，或者新的一批更新已经提交
    Complete,
    /// 上一批更新 GPU 尚未完成，本次什么都没有做，稍后重试
    StillInProgress,
}

/// 单个 entity 在 GPU 上的资源
pub struct EntityGpuBuffers {
    mesh: GpuMesh,
    /// 第一次同步时才创建，容量与 entity 的 instance 容量一致
    instance_buffer: Option<GfxBuffer>,
    instance_capacity: usize,
    /// 一条 `VkDrawIndirectCommand`
    draw_args: GfxBuffer,
}

impl EntityGpuBuffers {
    #[inline]
    pub fn mesh(&self) -> &GpuMesh {
        &self.mesh
    }

    #[inline]
    pub fn instance_buffer(&self) -> Option<&GfxBuffer> {
        self.instance_buffer.as_ref()
    }

    #[inline]
    pub fn draw_args(&self) -> &GfxBuffer {
        &self.draw_args
    }
}

/// 所有 entity 的 GPU 资源，按 [`EntityId`] 索引
///
/// 交换链重建不会触碰这里的任何资源
#[derive(Default)]
pub struct GpuEntityBuffers {
    entities: Vec<EntityGpuBuffers>,
}

// new & init
impl GpuEntityBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为新建的 entity 登记网格，并分配 indirect 参数 buffer
    pub fn register(&mut self, entity: EntityId, mesh: GpuMesh) -> anyhow::Result<()> {
        anyhow::ensure!(
            entity.0 == self.entities.len(),
            "entity {} registered out of order, expected {}",
            entity.0,
            self.entities.len()
        );

        let draw_args = GfxBuffer::new_device_local(
            DRAW_ARGS_SIZE,
            vk::BufferUsageFlags::INDIRECT_BUFFER,
            format!("entity-{}-draw-args", entity.0),
        )?;
        self.entities.push(EntityGpuBuffers {
            mesh,
            instance_buffer: None,
            instance_capacity: 0,
            draw_args,
        });
        Ok(())
    }

    /// 调用前需要保证 GPU 不再使用这些资源
    pub fn destroy(self) {
        for entity in self.entities {
            entity.mesh.destroy();
            if let Some(buffer) = entity.instance_buffer {
                buffer.destroy();
            }
            entity.draw_args.destroy();
        }
    }
}

// getters
impl GpuEntityBuffers {
    #[inline]
    pub fn get(&self, entity: EntityId) -> Option<&EntityGpuBuffers> {
        self.entities.get(entity.0)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// 把 dirty 更新录制进 transfer command buffer 的 sink
struct RecordingSink<'a> {
    buffers: &'a mut GpuEntityBuffers,
    cmd: &'a GfxCommandBuffer,
}

impl InstanceUploadSink for RecordingSink<'_> {
    fn ensure_instance_capacity(&mut self, entity: EntityId, capacity: usize) -> anyhow::Result<bool> {
        let gpu = self
            .buffers
            .entities
            .get_mut(entity.0)
            .ok_or_else(|| anyhow::anyhow!("entity {} has no gpu buffers", entity.0))?;
        if gpu.instance_buffer.is_some() && gpu.instance_capacity >= capacity {
            return Ok(false);
        }

        if let Some(old) = gpu.instance_buffer.take() {
            // 旧 buffer 可能仍被 in-flight 的绘制引用
            Gfx::get().gfx_queue().wait_idle()?;
            old.destroy();
        }

        let buffer = GfxBuffer::new_device_local(
            (capacity * size_of::<Instance>()) as vk::DeviceSize,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            format!("entity-{}-instances", entity.0),
        )?;
        log::debug!("entity {} instance buffer: {} -> {} instances", entity.0, gpu.instance_capacity, capacity);
        gpu.instance_buffer = Some(buffer);
        gpu.instance_capacity = capacity;
        Ok(true)
    }

    fn update_instances(&mut self, entity: EntityId, first_slot: usize, instances: &[Instance]) {
        let Some(buffer) = self.buffers.entities.get(entity.0).and_then(|gpu| gpu.instance_buffer.as_ref()) else {
            log::error!("entity {} updated before its instance buffer exists", entity.0);
            return;
        };
        self.cmd.cmd_update_buffer(
            buffer,
            (first_slot * size_of::<Instance>()) as vk::DeviceSize,
            bytemuck::cast_slice(instances),
        );
    }

    fn update_draw_count(&mut self, entity: EntityId, vertex_count: u32, instance_count: u32) {
        let Some(gpu) = self.buffers.entities.get(entity.0) else {
            log::error!("entity {} has no draw args buffer", entity.0);
            return;
        };
        // vertex_count, instance_count, first_vertex, first_instance
        let args: [u32; 4] = [vertex_count, instance_count, 0, 0];
        self.cmd.cmd_update_buffer(&gpu.draw_args, 0, bytemuck::cast_slice(&args));
    }
}

/// 一批 instance 更新的录制与提交
///
/// 真实实现是 [`GfxSyncRecorder`]，录制到共享的 transfer command buffer
pub trait SyncRecorder {
    type Fence: CompletionFence;
    /// 接收更新的 GPU 资源
    type Target;

    /// 把 store 中的 dirty 数据录制成一批命令，不提交
    fn record(&mut self, store: &mut EntityStore, target: &mut Self::Target) -> anyhow::Result<SyncReport>;

    /// 提交刚录制的命令，GPU 完成后 signal `fence`
    fn submit(&mut self, fence: &Self::Fence) -> anyhow::Result<()>;
}

/// 唯一的 instance 同步 command buffer
pub struct GfxSyncRecorder {
    command_pool: GfxCommandPool,
    command_buffer: GfxCommandBuffer,
}

impl GfxSyncRecorder {
    pub fn new() -> anyhow::Result<Self> {
        let command_pool = GfxCommandPool::new(
            Gfx::get().gfx_queue_family(),
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            "instance-sync",
        )?;
        let command_buffer = GfxCommandBuffer::new(&command_pool, "instance-sync")?;
        Ok(Self {
            command_pool,
            command_buffer,
        })
    }

    pub fn destroy(self) {
        GfxCommandBuffer::free(&self.command_pool, vec![self.command_buffer]);
        self.command_pool.destroy();
    }
}

impl SyncRecorder for GfxSyncRecorder {
    type Fence = GfxFence;
    type Target = GpuEntityBuffers;

    fn record(&mut self, store: &mut EntityStore, buffers: &mut GpuEntityBuffers) -> anyhow::Result<SyncReport> {
        let _span = tracy_client::span!("GfxSyncRecorder::record");

        let cmd = &self.command_buffer;
        cmd.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT, "instance-sync")?;

        // 之前提交的绘制读完 instance 与 indirect 参数之后才能写入
        cmd.memory_barrier(&[GfxMemoryBarrier::new()
            .src_mask(
                vk::PipelineStageFlags2::VERTEX_ATTRIBUTE_INPUT | vk::PipelineStageFlags2::DRAW_INDIRECT,
                vk::AccessFlags2::empty(),
            )
            .dst_mask(vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_WRITE)]);

        let report = store.record_dirty_updates(&mut RecordingSink { buffers, cmd })?;

        cmd.memory_barrier(&[GfxMemoryBarrier::new()
            .src_mask(vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_WRITE)
            .dst_mask(
                vk::PipelineStageFlags2::VERTEX_ATTRIBUTE_INPUT | vk::PipelineStageFlags2::DRAW_INDIRECT,
                vk::AccessFlags2::VERTEX_ATTRIBUTE_READ | vk::AccessFlags2::INDIRECT_COMMAND_READ,
            )]);
        cmd.end()?;
        Ok(report)
    }

    fn submit(&mut self, fence: &GfxFence) -> anyhow::Result<()> {
        Gfx::get().gfx_queue().submit(vec![GfxSubmitInfo::new(&[&self.command_buffer])], Some(fence))
    }
}

/// 共享同一个 command buffer 的 instance 同步器
///
/// 上一批更新尚未完成时不会重新录制，而是直接返回 [`SyncStatus::StillInProgress`]，
/// dirty 标记保持不变，下一次调用时再上传
pub struct InstanceSyncer<R: SyncRecorder = GfxSyncRecorder> {
    recorder: R,
    token: GpuToken<R::Fence>,
}

// new & init
impl InstanceSyncer<GfxSyncRecorder> {
    pub fn new() -> anyhow::Result<Self> {
        let recorder = GfxSyncRecorder::new()?;
        Ok(Self::with_recorder(recorder, GfxFence::new(false, "instance-sync")?))
    }

    /// 调用前 queue 需要处于 idle 状态
    pub fn destroy(self) {
        let Self { recorder, token } = self;
        recorder.destroy();
        token.into_fence().destroy();
    }
}

impl<R: SyncRecorder> InstanceSyncer<R> {
    /// `fence` 必须处于未触发状态
    pub fn with_recorder(recorder: R, fence: R::Fence) -> Self {
        Self {
            recorder,
            token: GpuToken::new(fence, "instance-sync"),
        }
    }
}

// getters
impl<R: SyncRecorder> InstanceSyncer<R> {
    #[inline]
    pub fn is_busy(&self) -> bool {
        self.token.is_busy()
    }
}

// update
impl<R: SyncRecorder> InstanceSyncer<R> {
    /// 非阻塞地提交一批 instance 更新
    pub fn sync_dirty_instances(
        &mut self,
        store: &mut EntityStore,
        target: &mut R::Target,
    ) -> anyhow::Result<SyncStatus> {
        if self.token.poll()? == TokenState::Pending {
            return Ok(SyncStatus::StillInProgress);
        }
        self.token.reclaim()?;

        if !store.has_pending_sync() {
            return Ok(SyncStatus::Complete);
        }

        let report = self.recorder.record(store, target)?;
        self.recorder.submit(self.token.fence())?;
        self.token.mark_submitted()?;

        log::trace!(
            "instance sync: {} update(s), {} instance(s), {} reallocation(s)",
            report.update_commands,
            report.updated_instances,
            report.reallocated_buffers
        );
        Ok(SyncStatus::Complete)
    }

    /// 阻塞等待上一批更新完成，用于退出前
    pub fn wait(&mut self, timeout_ns: u64) -> anyhow::Result<SyncStatus> {
        Ok(match self.token.wait(timeout_ns)? {
            TokenState::Pending => SyncStatus::StillInProgress,
            TokenState::Idle | TokenState::Ready => SyncStatus::Complete,
        })
    }
}

#[cfg(test)]
mod tests {
    use opendom_scene::instance::Instance;

    use super::*;
    use crate::{
        entity_store::{
            MeshBinding,
            tests::{MemorySink, small_config},
        },
        sync::gpu_token::tests::FakeFence,
    };

    /// 直接把更新写进内存的 recorder，记录调用次数
    #[derive(Default)]
    struct CountingRecorder {
        records: u32,
        submits: u32,
    }

    impl SyncRecorder for CountingRecorder {
        type Fence = FakeFence;
        type Target = MemorySink;

        fn record(&mut self, store: &mut EntityStore, sink: &mut MemorySink) -> anyhow::Result<SyncReport> {
            self.records += 1;
            store.record_dirty_updates(sink)
        }

        fn submit(&mut self, _fence: &FakeFence) -> anyhow::Result<()> {
            self.submits += 1;
            Ok(())
        }
    }

    fn syncer() -> InstanceSyncer<CountingRecorder> {
        InstanceSyncer::with_recorder(CountingRecorder::default(), FakeFence::default())
    }

    #[test]
    fn test_pending_batch_is_not_rerecorded() {
        let mut store = EntityStore::new(&small_config());
        let e = store.create_entity_definition(MeshBinding { vertex_count: 3 });
        store.add_instance(e, Instance::identity()).unwrap();
        let mut sink = MemorySink::default();
        let mut syncer = syncer();

        assert_eq!(syncer.sync_dirty_instances(&mut store, &mut sink).unwrap(), SyncStatus::Complete);
        assert_eq!((syncer.recorder.records, syncer.recorder.submits), (1, 1));
        assert!(syncer.is_busy());
        assert!(!store.has_pending_sync());

        // GPU 还在读上一批，新的修改只留在 dirty 标记里
        store.add_instance(e, Instance::identity()).unwrap();
        let status = syncer.sync_dirty_instances(&mut store, &mut sink).unwrap();
        assert_eq!(status, SyncStatus::StillInProgress);
        assert_eq!((syncer.recorder.records, syncer.recorder.submits), (1, 1));
        assert!(store.has_pending_sync());
        assert_eq!(sink.draw_counts[&e], (3, 1));

        syncer.token.fence().signaled.set(true);
        assert_eq!(syncer.sync_dirty_instances(&mut store, &mut sink).unwrap(), SyncStatus::Complete);
        assert_eq!((syncer.recorder.records, syncer.recorder.submits), (2, 2));
        assert_eq!(syncer.token.fence().reset_count.get(), 1);
        assert!(!store.has_pending_sync());
        assert_eq!(sink.draw_counts[&e], (3, 2));
    }

    #[test]
    fn test_nothing_pending_submits_nothing() {
        let mut store = EntityStore::new(&small_config());
        store.create_entity_definition(MeshBinding { vertex_count: 3 });
        let mut sink = MemorySink::default();
        let mut syncer = syncer();

        // 新建的 entity 需要写入一次为 0 的 draw count
        assert_eq!(syncer.sync_dirty_instances(&mut store, &mut sink).unwrap(), SyncStatus::Complete);
        syncer.token.fence().signaled.set(true);
        let submits = syncer.recorder.submits;

        assert_eq!(syncer.sync_dirty_instances(&mut store, &mut sink).unwrap(), SyncStatus::Complete);
        assert_eq!(syncer.recorder.submits, submits);
        assert!(!syncer.is_busy());
    }

    #[test]
    fn test_wait_reports_timeout() {
        let mut store = EntityStore::new(&small_config());
        let e = store.create_entity_definition(MeshBinding { vertex_count: 3 });
        store.add_instance(e, Instance::identity()).unwrap();
        let mut sink = MemorySink::default();
        let mut syncer = syncer();

        syncer.sync_dirty_instances(&mut store, &mut sink).unwrap();
        assert_eq!(syncer.wait(1_000).unwrap(), SyncStatus::StillInProgress);

        syncer.token.fence().signaled.set(true);
        assert_eq!(syncer.wait(1_000).unwrap(), SyncStatus::Complete);
    }
}
