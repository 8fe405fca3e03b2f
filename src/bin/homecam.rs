// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 家庭监控 - 检测到人时录制片段并发送邮件
/// Home camera monitor: record a clip when a person shows up and mail it
///
/// 主程序入口 - 直接运行: cargo run --bin homecam --release
use std::io::{self, BufRead, Write};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use homecam_rs::keep_awake::KeepAwake;
use homecam_rs::{
    Config, FfmpegSinkFactory, MailNotifier, Monitor, RtspCamera, StopToken, ToggleShell,
    YoloDetector,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("homecam_rs=info,homecam=info")),
        )
        .init();

    config.validate()?;

    info!("📹 摄像头: {}", config.rtsp_url_redacted());
    info!("⏱️ 片段时长: {}秒", config.snippet_duration);
    info!("📧 收件人: {}", config.recipients().join(", "));

    let _keep_awake = config
        .keep_awake_command()
        .and_then(|cmd| KeepAwake::spawn(&cmd));

    // 模型只加载一次, 多次启停共用
    info!("📦 加载模型: {}", config.model);
    let detector = YoloDetector::new(
        &config.model,
        config.model_input_size,
        config.detection_confidence,
    )
    .with_context(|| format!("无法加载模型 {}", config.model))?;
    let detector = Arc::new(Mutex::new(detector));
    let sinks = Arc::new(FfmpegSinkFactory::new(config.clip_codec.clone()));

    let spawn_config = config.clone();
    let mut shell = ToggleShell::new(move |stop: StopToken| {
        let camera = RtspCamera::new(
            spawn_config.rtsp_url(),
            spawn_config.rtsp_url_redacted(),
            spawn_config.frame_size(),
        );
        let monitor = Monitor::new(
            camera,
            detector.clone(),
            sinks.clone(),
            MailNotifier::from_config(&spawn_config),
            spawn_config.monitor_settings(),
        );
        std::thread::Builder::new()
            .name("monitor".to_string())
            .spawn(move || match monitor.run(&stop) {
                Ok(report) => info!(
                    "📊 本次运行: {:.1}fps | {}帧 | 片段{}个 | 已发送{}个",
                    report.fps,
                    report.frames,
                    report.clips.len(),
                    report.notified.len()
                ),
                Err(e) => error!("❌ 监控循环退出: {}", e),
            })
    });

    println!();
    println!("回车 = 启动/停止监控, q = 退出");
    print_prompt(shell.label())?;

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("读取控制台输入失败")?;
        match line.trim() {
            "q" | "quit" | "exit" => break,
            "" => {
                shell.toggle().context("无法启动监控线程")?;
            }
            other => println!("未知命令: {}", other),
        }
        print_prompt(shell.label())?;
    }

    shell.shutdown();
    info!("👋 退出");
    Ok(())
}

fn print_prompt(label: &str) -> Result<()> {
    print!("[{}] > ", label);
    io::stdout().flush()?;
    Ok(())
}
