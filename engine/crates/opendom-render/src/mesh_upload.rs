use ash::vk;
use opendom_gfx::{
    commands::{
        barrier::GfxBufferBarrier, command_buffer::GfxCommandBuffer, command_pool::GfxCommandPool, fence::GfxFence,
        submit_info::GfxSubmitInfo,
    },
    gfx::Gfx,
    resources::buffer::GfxBuffer,
};
use opendom_scene::{mesh::MeshData, vertex::Vertex};

use crate::{
    config::RendererConfig,
    sync::gpu_token::{CompletionFence, GpuToken, TokenState},
};

/// 已经上传到 device local 内存的网格
pub struct GpuMesh {
    vertex_buffer: GfxBuffer,
    vertex_count: u32,
}

impl GpuMesh {
    #[inline]
    pub fn vertex_buffer(&self) -> &GfxBuffer {
        &self.vertex_buffer
    }

    #[inline]
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    #[inline]
    pub fn destroy(self) {
        self.vertex_buffer.destroy();
    }
}

/// staging buffer 一次能搬运的数据片段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagingChunk {
    /// 在目标 buffer 中的偏移
    pub offset: u64,
    pub size: u64,
}

/// 将 `total_bytes` 按 staging buffer 的大小切分为顺序上传的片段
pub fn plan_staging_chunks(total_bytes: u64, staging_bytes: u64) -> Vec<StagingChunk> {
    assert!(staging_bytes > 0);
    (0..total_bytes)
        .step_by(staging_bytes as usize)
        .map(|offset| StagingChunk {
            offset,
            size: u64::min(staging_bytes, total_bytes - offset),
        })
        .collect()
}

/// staging buffer 与一次 staging -> 目标 buffer 的拷贝
///
/// 真实实现是 [`GfxStagingTransfer`]
pub trait StagingTransfer {
    type Fence: CompletionFence;
    /// 拷贝的目标 buffer
    type Target;

    fn staging_size(&self) -> u64;

    fn create_target(&mut self, size: u64, debug_name: &str) -> anyhow::Result<Self::Target>;

    /// 从头覆写 staging buffer，调用前 GPU 必须已经读完上一次的内容
    fn write_staging(&mut self, bytes: &[u8]) -> anyhow::Result<()>;

    /// 提交一次拷贝；`last` 时附带到 vertex input 的 barrier
    fn submit_copy(
        &mut self,
        target: &Self::Target,
        chunk: StagingChunk,
        last: bool,
        fence: &Self::Fence,
    ) -> anyhow::Result<()>;
}

/// 唯一的 staging buffer 和专用的 command buffer
pub struct GfxStagingTransfer {
    staging: GfxBuffer,
    command_pool: GfxCommandPool,
    command_buffer: GfxCommandBuffer,
}

impl GfxStagingTransfer {
    pub fn new(config: &RendererConfig) -> anyhow::Result<Self> {
        let queue_family = Gfx::get().gfx_queue_family();
        anyhow::ensure!(
            queue_family
                .queue_flags
                .intersects(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
            "queue family {} cannot execute transfer commands",
            queue_family.name
        );

        let staging_size = (config.staging_vertex_capacity * size_of::<Vertex>()) as vk::DeviceSize;
        let staging = GfxBuffer::new_stage_buffer(staging_size, "mesh-staging")?;

        let command_pool =
            GfxCommandPool::new(queue_family, vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER, "mesh-upload")?;
        let command_buffer = GfxCommandBuffer::new(&command_pool, "mesh-upload")?;

        log::info!("mesh staging buffer: {} vertices, {} bytes", config.staging_vertex_capacity, staging_size);
        Ok(Self {
            staging,
            command_pool,
            command_buffer,
        })
    }

    pub fn destroy(self) {
        GfxCommandBuffer::free(&self.command_pool, vec![self.command_buffer]);
        self.command_pool.destroy();
        self.staging.destroy();
    }
}

impl StagingTransfer for GfxStagingTransfer {
    type Fence = GfxFence;
    type Target = GfxBuffer;

    #[inline]
    fn staging_size(&self) -> u64 {
        self.staging.size()
    }

    fn create_target(&mut self, size: u64, debug_name: &str) -> anyhow::Result<GfxBuffer> {
        GfxBuffer::new_device_local(size, vk::BufferUsageFlags::VERTEX_BUFFER, format!("{debug_name}-vertices"))
    }

    #[inline]
    fn write_staging(&mut self, bytes: &[u8]) -> anyhow::Result<()> {
        self.staging.write_bytes(0, bytes)
    }

    fn submit_copy(
        &mut self,
        vertex_buffer: &GfxBuffer,
        chunk: StagingChunk,
        last: bool,
        fence: &GfxFence,
    ) -> anyhow::Result<()> {
        let cmd = &self.command_buffer;
        cmd.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT, "mesh-upload")?;
        cmd.cmd_copy_buffer(
            &self.staging,
            vertex_buffer,
            &[vk::BufferCopy {
                src_offset: 0,
                dst_offset: chunk.offset,
                size: chunk.size,
            }],
        );
        if last {
            cmd.buffer_memory_barrier(&[GfxBufferBarrier::new(vertex_buffer)
                .src_mask(vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_WRITE)
                .dst_mask(vk::PipelineStageFlags2::VERTEX_ATTRIBUTE_INPUT, vk::AccessFlags2::VERTEX_ATTRIBUTE_READ)]);
        }
        cmd.end()?;

        Gfx::get().gfx_queue().submit(vec![GfxSubmitInfo::new(&[cmd])], Some(fence))
    }
}

/// 通过唯一的 staging buffer 串行上传顶点数据
///
/// 每次覆写 staging buffer 之前都要等待上一次拷贝完成，
/// 网格只在启动阶段加载，串行化的代价可以接受
pub struct MeshUploader<T: StagingTransfer = GfxStagingTransfer> {
    transfer: T,
    token: GpuToken<T::Fence>,
}

// new & init
impl MeshUploader<GfxStagingTransfer> {
    pub fn new(config: &RendererConfig) -> anyhow::Result<Self> {
        let transfer = GfxStagingTransfer::new(config)?;
        Ok(Self::with_transfer(transfer, GfxFence::new(false, "mesh-upload")?))
    }

    /// 等待最后一次上传完成后释放所有资源
    pub fn destroy(mut self) -> anyhow::Result<()> {
        self.wait_staging_idle()?;

        let Self { transfer, token } = self;
        token.into_fence().destroy();
        transfer.destroy();
        Ok(())
    }
}

impl<T: StagingTransfer> MeshUploader<T> {
    /// `fence` 必须处于未触发状态
    pub fn with_transfer(transfer: T, fence: T::Fence) -> Self {
        Self {
            transfer,
            token: GpuToken::new(fence, "mesh-upload"),
        }
    }
}

// getters
impl<T: StagingTransfer> MeshUploader<T> {
    /// staging buffer 是否仍在被 GPU 读取
    #[inline]
    pub fn is_busy(&self) -> bool {
        self.token.is_busy()
    }
}

// tools
impl MeshUploader<GfxStagingTransfer> {
    /// 创建大小恰好等于网格数据的 device local buffer，并提交拷贝
    ///
    /// 返回时拷贝可能仍在进行，同一 queue 上后续的绘制由 barrier 保证顺序
    pub fn upload(&mut self, mesh: &MeshData, debug_name: &str) -> anyhow::Result<GpuMesh> {
        let _span = tracy_client::span!("MeshUploader::upload");
        anyhow::ensure!(!mesh.is_empty(), "mesh {} has no vertices", debug_name);

        let vertex_buffer = self.upload_bytes(mesh.as_bytes(), debug_name)?;

        log::info!("uploaded mesh {}: {} vertices", debug_name, mesh.vertex_count());
        Ok(GpuMesh {
            vertex_buffer,
            vertex_count: mesh.vertex_count(),
        })
    }
}

impl<T: StagingTransfer> MeshUploader<T> {
    /// 按 staging buffer 的大小分片上传，每片覆写 staging 之前等待上一片完成
    pub fn upload_bytes(&mut self, bytes: &[u8], debug_name: &str) -> anyhow::Result<T::Target> {
        anyhow::ensure!(!bytes.is_empty(), "mesh {} has no vertices", debug_name);

        let target = self.transfer.create_target(bytes.len() as u64, debug_name)?;

        let chunks = plan_staging_chunks(bytes.len() as u64, self.transfer.staging_size());
        let chunk_count = chunks.len();
        for (idx, chunk) in chunks.into_iter().enumerate() {
            self.wait_staging_idle()?;

            let range = chunk.offset as usize..(chunk.offset + chunk.size) as usize;
            self.transfer.write_staging(&bytes[range])?;
            self.transfer.submit_copy(&target, chunk, idx + 1 == chunk_count, self.token.fence())?;
            self.token.mark_submitted()?;
        }

        log::debug!("mesh {}: {} bytes in {} chunk(s)", debug_name, bytes.len(), chunk_count);
        Ok(target)
    }

    /// 阻塞直到 staging buffer 可以被覆写
    fn wait_staging_idle(&mut self) -> anyhow::Result<()> {
        if self.token.wait(u64::MAX)? == TokenState::Pending {
            anyhow::bail!("mesh upload did not complete");
        }
        self.token.reclaim()
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;
    use crate::sync::gpu_token::WaitOutcome;

    #[test]
    fn test_single_chunk() {
        assert_eq!(plan_staging_chunks(480, 4800), vec![StagingChunk { offset: 0, size: 480 }]);
        assert_eq!(plan_staging_chunks(4800, 4800), vec![StagingChunk { offset: 0, size: 4800 }]);
    }

    #[test]
    fn test_mesh_larger_than_staging() {
        let chunks = plan_staging_chunks(250, 100);
        assert_eq!(
            chunks,
            vec![
                StagingChunk { offset: 0, size: 100 },
                StagingChunk { offset: 100, size: 100 },
                StagingChunk { offset: 200, size: 50 },
            ]
        );
        assert_eq!(chunks.iter().map(|c| c.size).sum::<u64>(), 250);
    }

    #[test]
    fn test_empty() {
        assert!(plan_staging_chunks(0, 100).is_empty());
    }

    /// 模拟 GPU 的事件顺序
    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Wait,
        Reset,
        Write(usize),
        Copy { offset: u64, size: u64, last: bool },
    }

    type EventLog = Rc<RefCell<Vec<Event>>>;

    /// 拷贝只在 CPU 等待时才完成
    struct LoggedFence {
        log: EventLog,
        completes: bool,
    }

    impl CompletionFence for LoggedFence {
        fn is_signaled(&self) -> anyhow::Result<bool> {
            Ok(false)
        }

        fn wait(&self, _timeout_ns: u64) -> anyhow::Result<WaitOutcome> {
            self.log.borrow_mut().push(Event::Wait);
            Ok(if self.completes { WaitOutcome::Signaled } else { WaitOutcome::Timeout })
        }

        fn reset(&self) -> anyhow::Result<()> {
            self.log.borrow_mut().push(Event::Reset);
            Ok(())
        }
    }

    struct MemoryTransfer {
        log: EventLog,
        staging: Vec<u8>,
    }

    impl StagingTransfer for MemoryTransfer {
        type Fence = LoggedFence;
        type Target = RefCell<Vec<u8>>;

        fn staging_size(&self) -> u64 {
            self.staging.len() as u64
        }

        fn create_target(&mut self, size: u64, _debug_name: &str) -> anyhow::Result<Self::Target> {
            Ok(RefCell::new(vec![0; size as usize]))
        }

        fn write_staging(&mut self, bytes: &[u8]) -> anyhow::Result<()> {
            self.log.borrow_mut().push(Event::Write(bytes.len()));
            self.staging[..bytes.len()].copy_from_slice(bytes);
            Ok(())
        }

        fn submit_copy(
            &mut self,
            target: &Self::Target,
            chunk: StagingChunk,
            last: bool,
            _fence: &LoggedFence,
        ) -> anyhow::Result<()> {
            self.log.borrow_mut().push(Event::Copy {
                offset: chunk.offset,
                size: chunk.size,
                last,
            });
            let dst = chunk.offset as usize..(chunk.offset + chunk.size) as usize;
            target.borrow_mut()[dst].copy_from_slice(&self.staging[..chunk.size as usize]);
            Ok(())
        }
    }

    fn uploader(staging_size: usize, completes: bool) -> (MeshUploader<MemoryTransfer>, EventLog) {
        let log = EventLog::default();
        let transfer = MemoryTransfer {
            log: log.clone(),
            staging: vec![0; staging_size],
        };
        let fence = LoggedFence {
            log: log.clone(),
            completes,
        };
        (MeshUploader::with_transfer(transfer, fence), log)
    }

    #[test]
    fn test_each_chunk_waits_for_previous_copy() {
        let (mut uploader, log) = uploader(100, true);
        let bytes: Vec<u8> = (0..250).map(|i| i as u8).collect();

        let target = uploader.upload_bytes(&bytes, "test").unwrap();
        assert_eq!(target.into_inner(), bytes);
        assert!(uploader.is_busy());

        assert_eq!(
            *log.borrow(),
            vec![
                Event::Write(100),
                Event::Copy { offset: 0, size: 100, last: false },
                Event::Wait,
                Event::Reset,
                Event::Write(100),
                Event::Copy { offset: 100, size: 100, last: false },
                Event::Wait,
                Event::Reset,
                Event::Write(50),
                Event::Copy { offset: 200, size: 50, last: true },
            ]
        );
    }

    #[test]
    fn test_next_upload_waits_for_last_chunk() {
        let (mut uploader, log) = uploader(100, true);
        uploader.upload_bytes(&[1; 40], "a").unwrap();
        uploader.upload_bytes(&[2; 40], "b").unwrap();

        let events = log.borrow();
        let second_write = events.iter().rposition(|e| *e == Event::Write(40)).unwrap();
        assert_eq!(&events[second_write - 2..second_write], &[Event::Wait, Event::Reset]);
    }

    #[test]
    fn test_stuck_copy_does_not_overwrite_staging() {
        let (mut uploader, log) = uploader(100, false);
        assert!(uploader.upload_bytes(&[7; 150], "stuck").is_err());

        // 第二片没有写入 staging
        let writes = log.borrow().iter().filter(|e| matches!(e, Event::Write(_))).count();
        assert_eq!(writes, 1);
    }

    #[test]
    fn test_empty_bytes_rejected() {
        let (mut uploader, log) = uploader(100, true);
        assert!(uploader.upload_bytes(&[], "empty").is_err());
        assert!(log.borrow().is_empty());
    }
}
