use std::io::Write;

use anstyle::{AnsiColor, Color, RgbColor, Style};
use env_logger::fmt::Formatter;

/// 日志格式：`[时间] 级别 [文件:行号] 内容`
///
/// 级别按颜色区分，文件位置和内容使用灰色
fn format_record(buf: &mut Formatter, record: &log::Record) -> std::io::Result<()> {
    let level_color = match record.level() {
        log::Level::Error => Some(Color::Ansi(AnsiColor::Red)),
        log::Level::Warn => Some(Color::Ansi(AnsiColor::Yellow)),
        log::Level::Info => Some(Color::Ansi(AnsiColor::Green)),
        _ => None,
    };
    let level_style = match level_color {
        Some(color) => buf.default_level_style(record.level()).fg_color(Some(color)),
        None => buf.default_level_style(record.level()),
    };
    let location_style = Style::new().fg_color(Some(Color::Rgb(RgbColor(110, 110, 110))));

    // windows 下的路径使用 `\`，只保留文件名
    let file = record.file().unwrap_or("").rsplit(['\\', '/']).next().unwrap_or("");
    let line = record.line().unwrap_or(0);
    let time = chrono::Local::now().format("%H:%M:%S%.3f");

    writeln!(
        buf,
        "{level_style}[{time}] {:<5}{level_style:#} {location_style}[{file}:{line}]{location_style:#} {}",
        record.level(),
        record.args()
    )
}

/// 默认 Info 级别，可以通过 `RUST_LOG` 覆盖
pub fn init_log() {
    init_log_with_level(log::LevelFilter::Info);
}

pub fn init_log_with_level(level: log::LevelFilter) {
    env_logger::Builder::new().format(format_record).filter(None, level).parse_default_env().init();
}

/// 测试中使用：输出交给 test harness 捕获，多次调用不会 panic
pub fn init_log_for_test() {
    let _ = env_logger::Builder::new()
        .format(format_record)
        .filter(None, log::LevelFilter::Debug)
        .is_test(true)
        .try_init();
}
