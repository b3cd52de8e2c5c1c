use std::io::Write;

/// 安装全局 logger
///
/// 默认级别为 Info，可以通过 `RUST_LOG` 覆盖
pub fn init_log() {
    env_logger::Builder::new()
        .format(|buf, record| {
            let level_style = match record.level() {
                log::Level::Error => level_color(buf, record.level(), anstyle::AnsiColor::Red),
                log::Level::Warn => level_color(buf, record.level(), anstyle::AnsiColor::Yellow),
                log::Level::Info => level_color(buf, record.level(), anstyle::AnsiColor::Green),
                log::Level::Debug => level_color(buf, record.level(), anstyle::AnsiColor::Cyan),
                log::Level::Trace => buf.default_level_style(record.level()),
            };
            let location_style = anstyle::Style::new().fg_color(Some(anstyle::Color::Rgb(anstyle::RgbColor(110, 110, 110))));

            // windows 下的路径分隔符也需要处理
            let file = record.file().unwrap_or("").rsplit(['/', '\\']).next().unwrap_or("");
            let line = record.line().unwrap_or(0);
            let time = chrono::Local::now().format("%H:%M:%S%.3f");

            writeln!(
                buf,
                "{level_style}[{time}] {:<5}{level_style:#} {location_style}[{file}:{line}]{location_style:#} {}",
                record.level(),
                record.args()
            )
        })
        .filter(None, log::LevelFilter::Info)
        .parse_default_env()
        .init();
}

fn level_color(buf: &env_logger::fmt::Formatter, level: log::Level, color: anstyle::AnsiColor) -> anstyle::Style {
    buf.default_level_style(level).fg_color(Some(anstyle::Color::Ansi(color)))
}
