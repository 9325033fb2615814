use std::io::Write;

/// 带颜色的日志格式：`[时间] LEVEL [file:line] message`
fn colored_builder(filter: log::LevelFilter) -> env_logger::Builder {
    let mut builder = env_logger::Builder::new();
    builder
        .format(|buf, record| {
            let info_style = buf
                .default_level_style(log::Level::Info)
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green)));
            let warn_style = buf
                .default_level_style(log::Level::Warn)
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow)));
            let error_style = buf
                .default_level_style(log::Level::Error)
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red)));

            let level_style = match record.level() {
                log::Level::Info => info_style,
                log::Level::Warn => warn_style,
                log::Level::Error => error_style,
                _ => buf.default_level_style(record.level()),
            };
            let grey_style = info_style.fg_color(Some(anstyle::Color::Rgb(anstyle::RgbColor(110, 110, 110))));
            let black_style = info_style.fg_color(Some(anstyle::Color::Rgb(anstyle::RgbColor(75, 75, 75))));

            let line = record.line().unwrap_or(!0);
            let file = record.file().unwrap_or("").split(['\\', '/']).last().unwrap_or("");
            let time = chrono::Local::now().format("%H:%M:%S%.3f");
            let level = record.level();

            writeln!(
                buf,
                "{level_style}[{time}] {level}{level_style:#} {grey_style}[{file}:{line}]{grey_style:#} \
                 {black_style}{}{black_style:#}",
                record.args()
            )
        })
        .filter(None, filter);
    builder
}

/// 初始化全局日志，默认 Info 级别
///
/// `RUST_LOG` 环境变量中的规则会覆盖默认级别。
pub fn init_log() {
    init_log_with_filter(log::LevelFilter::Info);
}

pub fn init_log_with_filter(filter: log::LevelFilter) {
    let mut builder = colored_builder(filter);
    if let Ok(rules) = std::env::var("RUST_LOG") {
        builder.parse_filters(&rules);
    }
    builder.init();
}

/// 测试用：输出交给 libtest 捕获，重复初始化会被忽略
pub fn init_test_log() {
    let _ = colored_builder(log::LevelFilter::Debug).is_test(true).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_can_be_initialized_twice() {
        init_test_log();
        init_test_log();
        log::debug!("logger ready");
    }
}
