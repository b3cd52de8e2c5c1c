use opendom_crate_tools::{init_log::init_log, resource::OpendomPath};
use opendom_render::config::RendererConfig;
use opendom_winit_app::app::OpendomApp;

fn main() -> anyhow::Result<()> {
    init_log();

    let config = RendererConfig::load_or_default(OpendomPath::config_path())?;
    OpendomApp::run(config)
}
