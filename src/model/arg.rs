use clap::Parser;

/// 提示词优化服务
#[derive(Parser, Debug)]
#[command(name = "prompt-optimizer")]
#[command(about = "提示词优化 HTTP 服务", long_about = None)]
pub struct Args {
    /// 配置文件路径
    #[arg(short, long)]
    pub config: Option<String>,

    /// 覆盖监听地址
    #[arg(long)]
    pub host: Option<String>,

    /// 覆盖监听端口
    #[arg(short, long)]
    pub port: Option<u16>,
}
