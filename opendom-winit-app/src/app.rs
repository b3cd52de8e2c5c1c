use ash::vk;
use glam::{Quat, Vec3};
use opendom_render::{
    config::RendererConfig, frame_sync::FrameOutcome, instance_sync::SyncStatus, render_state::RenderState,
};
use opendom_scene::instance::Instance;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

use crate::{input_state::InputState, obj_importer::ObjImporter};

/// 启动时放置的唯一实例的缩放
const INITIAL_INSTANCE_SCALE: f32 = 0.01;

pub struct OpendomApp {
    config: RendererConfig,
    input: InputState,

    render_state: Option<RenderState>,
    window: Option<Window>,

    /// 事件回调里无法返回错误，先记下来，退出事件循环后再返回
    fatal_error: Option<anyhow::Error>,
}
// 总的 main 函数
impl OpendomApp {
    /// 整个程序的入口，直到窗口关闭或出现不可恢复的错误才返回
    pub fn run(config: RendererConfig) -> anyhow::Result<()> {
        let event_loop = EventLoop::new()?;
        event_loop.set_control_flow(ControlFlow::Poll);

        let mut app = Self::new(config);
        event_loop.run_app(&mut app)?;
        log::info!("end run.");

        app.destroy();
        match app.fatal_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
// new & init
impl OpendomApp {
    fn new(config: RendererConfig) -> Self {
        Self {
            input: InputState::new([config.window_width, config.window_height]),
            config,
            render_state: None,
            window: None,
            fatal_error: None,
        }
    }

    /// 在 window 创建之后调用，初始化渲染核心并放入初始模型
    fn init_after_window(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<()> {
        let window_attr = Window::default_attributes()
            .with_title(self.config.window_title.clone())
            .with_inner_size(PhysicalSize::new(self.config.window_width, self.config.window_height));
        let window = event_loop.create_window(window_attr)?;

        let size = window.inner_size();
        self.input.on_resized(size.width, size.height);

        let render_state = RenderState::init_graphics(
            self.config.clone(),
            window.display_handle()?.as_raw(),
            window.window_handle()?.as_raw(),
            vk::Extent2D {
                width: size.width,
                height: size.height,
            },
        )?;
        // 先放进 self，后面出错时也能正常销毁
        self.window = Some(window);
        let render_state = self.render_state.insert(render_state);

        let mesh = ObjImporter::load(self.config.model_path())?;
        let entity = render_state.create_entity_definition(&mesh)?;
        render_state.add_instance(
            entity,
            Instance::new(Vec3::ZERO, Quat::IDENTITY, Vec3::ONE).with_uniform_scale(INITIAL_INSTANCE_SCALE),
        )?;

        log::info!(
            "scene ready: {} entity definition(s), swapchain {}x{} with {} images",
            render_state.store().len(),
            render_state.swapchain_extent().width,
            render_state.swapchain_extent().height,
            render_state.image_count()
        );
        Ok(())
    }
}
// update
impl OpendomApp {
    fn redraw(&mut self) -> anyhow::Result<()> {
        let Some(render_state) = self.render_state.as_mut() else {
            return Ok(());
        };

        render_state.set_input(self.input.snapshot());
        render_state.move_camera();
        let outcome = render_state.draw_frame()?;
        let sync_status = render_state.last_sync_status();
        if outcome != FrameOutcome::Presented || sync_status != SyncStatus::Complete {
            log::trace!("frame outcome: {:?}, instance sync: {:?}", outcome, sync_status);
        }
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        log::error!("fatal: {:#}", err);
        self.fatal_error.get_or_insert(err);
        event_loop.exit();
    }
}
// destroy
impl OpendomApp {
    /// surface 依赖 window，所以先销毁渲染核心
    fn destroy(&mut self) {
        if let Some(render_state) = self.render_state.take() {
            if let Err(err) = render_state.destroy() {
                log::error!("failed to destroy render state: {:#}", err);
                self.fatal_error.get_or_insert(err);
            }
        }
        self.window = None;
    }
}
// 各种 winit 的事件处理
impl ApplicationHandler for OpendomApp {
    // 建议在这里创建 window 和 Renderer
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        log::info!("winit event: resumed");
        if self.window.is_some() {
            return;
        }

        if let Err(err) = self.init_after_window(event_loop) {
            self.fail(event_loop, err);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        self.input.handle_window_event(&event);

        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(render_state) = self.render_state.as_mut() {
                    render_state.resize(vk::Extent2D {
                        width: size.width,
                        height: size.height,
                    });
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(err) = self.redraw() {
                    self.fail(event_loop, err);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }

    fn suspended(&mut self, _event_loop: &ActiveEventLoop) {
        log::warn!("winit event: suspended");
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        log::info!("loop exiting");
        self.destroy();
    }
}
