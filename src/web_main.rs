//! Web 服务器主程序入口
//!
//! ```bash
//! lingo-relay-web --bind 0.0.0.0 --port 3000 --config ./translation-config.toml
//! ```

use std::str::FromStr;

use clap::Parser;
use lingo_relay::env::{core::LogLevel, EnvVar};
use lingo_relay::translation::{ConfigManager, TranslationService};
use lingo_relay::web::{WebConfig, WebServer};

/// lingo-relay 翻译中继服务
#[derive(Parser, Debug)]
#[command(name = "lingo-relay-web", version, about)]
struct Args {
    /// 绑定地址，默认取 LINGO_WEB_BIND_ADDRESS
    #[arg(short, long)]
    bind: Option<String>,

    /// 端口，默认取 LINGO_WEB_PORT
    #[arg(short, long)]
    port: Option<u16>,

    /// 翻译配置文件路径，不指定时按默认位置查找
    #[arg(short, long)]
    config: Option<String>,

    /// 静态文件目录
    #[arg(long)]
    static_dir: Option<String>,

    /// 生成示例配置文件后退出
    #[arg(long, value_name = "PATH")]
    generate_config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let level = LogLevel::get().unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::from_str(&level).unwrap_or(tracing::Level::INFO))
        .init();

    if let Some(path) = args.generate_config {
        ConfigManager::generate_example_config(&path)?;
        println!("已生成示例配置文件: {}", path);
        return Ok(());
    }

    let manager = match args.config {
        Some(path) => ConfigManager::from_path(&path)?,
        None => ConfigManager::new()?,
    };
    let service = TranslationService::from_config(manager.into_config())?;

    let mut web_config = WebConfig::default();
    if let Some(bind) = args.bind {
        web_config.bind_addr = bind;
    }
    if let Some(port) = args.port {
        web_config.port = port;
    }
    if args.static_dir.is_some() {
        web_config.static_dir = args.static_dir;
    }
    web_config.validate()?;

    let server = WebServer::new(web_config, service);
    server.start().await?;

    Ok(())
}
