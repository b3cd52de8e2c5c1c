use opendom_gfx::commands::fence::GfxFence;

/// 一次有限时长等待的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Signaled,
    Timeout,
}

/// CPU 可以观察的 GPU 完成信号
///
/// 真实实现是 [`GfxFence`]，测试中使用假的实现
pub trait CompletionFence {
    /// 非阻塞查询
    fn is_signaled(&self) -> anyhow::Result<bool>;

    fn wait(&self, timeout_ns: u64) -> anyhow::Result<WaitOutcome>;

    fn reset(&self) -> anyhow::Result<()>;
}

impl CompletionFence for GfxFence {
    #[inline]
    fn is_signaled(&self) -> anyhow::Result<bool> {
        GfxFence::is_signaled(self)
    }

    #[inline]
    fn wait(&self, timeout_ns: u64) -> anyhow::Result<WaitOutcome> {
        let signaled = GfxFence::wait(self, timeout_ns)?;
        Ok(if signaled { WaitOutcome::Signaled } else { WaitOutcome::Timeout })
    }

    #[inline]
    fn reset(&self) -> anyhow::Result<()> {
        GfxFence::reset(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    /// 没有 GPU 工作在使用该资源，fence 处于未触发状态
    Idle,
    /// 已经提交，GPU 尚未确认完成
    Pending,
    /// GPU 已经完成，fence 仍处于触发状态，需要 reclaim 之后才能再次提交
    Ready,
}

/// 单写者共享资源的忙碌状态
///
/// 状态转换：
/// - Idle --mark_submitted--> Pending
/// - Pending --poll/wait--> Ready
/// - Ready --reclaim--> Idle
///
/// fence 必须以未触发状态创建
pub struct GpuToken<F> {
    fence: F,
    state: TokenState,
    name: String,
}

// new & init
impl<F: CompletionFence> GpuToken<F> {
    pub fn new(fence: F, name: impl Into<String>) -> Self {
        Self {
            fence,
            state: TokenState::Idle,
            name: name.into(),
        }
    }

    /// 取回内部的 fence，用于销毁
    #[inline]
    pub fn into_fence(self) -> F {
        self.fence
    }
}

// getters
impl<F: CompletionFence> GpuToken<F> {
    #[inline]
    pub fn state(&self) -> TokenState {
        self.state
    }

    /// 资源是否仍被 GPU 使用
    #[inline]
    pub fn is_busy(&self) -> bool {
        self.state == TokenState::Pending
    }

    /// 提交时需要传给 queue 的 fence
    #[inline]
    pub fn fence(&self) -> &F {
        &self.fence
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

// update
impl<F: CompletionFence> GpuToken<F> {
    /// 提交之后调用；Ready 状态的 token 必须先 reclaim
    pub fn mark_submitted(&mut self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.state == TokenState::Idle,
            "gpu token {} submitted while {:?}",
            self.name,
            self.state
        );
        self.state = TokenState::Pending;
        Ok(())
    }

    /// 非阻塞查询，Pending 在 GPU 完成后转为 Ready
    pub fn poll(&mut self) -> anyhow::Result<TokenState> {
        if self.state == TokenState::Pending && self.fence.is_signaled()? {
            self.state = TokenState::Ready;
        }
        Ok(self.state)
    }

    /// 有限时长的阻塞等待
    pub fn wait(&mut self, timeout_ns: u64) -> anyhow::Result<TokenState> {
        if self.state == TokenState::Pending {
            match self.fence.wait(timeout_ns)? {
                WaitOutcome::Signaled => self.state = TokenState::Ready,
                WaitOutcome::Timeout => log::debug!("gpu token {} still pending after {}ns", self.name, timeout_ns),
            }
        }
        Ok(self.state)
    }

    /// Ready -> Idle，重置 fence；Idle 时什么都不做
    pub fn reclaim(&mut self) -> anyhow::Result<()> {
        match self.state {
            TokenState::Idle => Ok(()),
            TokenState::Ready => {
                self.fence.reset()?;
                self.state = TokenState::Idle;
                Ok(())
            }
            TokenState::Pending => anyhow::bail!("gpu token {} reclaimed while pending", self.name),
        }
    }
}
