use clap::Parser;
use std::path::PathBuf;

/// B站视频下载任务工具
#[derive(Parser, Debug)]
#[command(name = "bilitask")]
#[command(version = "1.0")]
#[command(author = "rpeng252@gmail.com")]
#[command(about = "提交B站视频下载任务，选择画质并合并音视频", long_about = None)]
pub struct Cli {
    /// 视频链接，可以重复指定多个
    #[arg(long, value_name = "URL", required = true, num_args = 1..)]
    #[arg(value_hint = clap::ValueHint::Url)]
    pub url: Vec<String>,

    /// 是否合并音视频
    #[arg(long, value_name = "BOOL", default_value_t = true, action = clap::ArgAction::Set)]
    pub merge: bool,

    /// 自定义文件名（不含扩展名）
    #[arg(long, value_name = "NAME")]
    pub filename: Option<String>,

    /// 视频质量下标，0 为最高画质
    #[arg(long, value_name = "INDEX", default_value_t = 0)]
    pub video_quality: usize,

    /// 音频质量下标，0 为最高音质
    #[arg(long, value_name = "INDEX", default_value_t = 0)]
    pub audio_quality: usize,

    /// 最终文件保存目录
    #[arg(long, value_name = "DIR", default_value = ".")]
    #[arg(value_hint = clap::ValueHint::DirPath)]
    pub output_dir: PathBuf,

    /// 下载过程中的工作目录
    #[arg(long, value_name = "DIR", default_value = "downloads")]
    #[arg(value_hint = clap::ValueHint::DirPath)]
    pub download_dir: PathBuf,

    /// Cookie 文件（原始 Cookie 字符串或 JSON 对象）
    #[arg(long, value_name = "FILE", default_value = "cookies.txt")]
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub cookie_file: PathBuf,

    /// 最大并发下载任务数
    #[arg(long, value_name = "N", default_value_t = 5)]
    pub concurrency: usize,

    /// ffmpeg 可执行文件路径（默认读取 FFMPEG_PATH 环境变量）
    #[arg(long, value_name = "PATH")]
    pub ffmpeg: Option<String>,

    /// 只列出可选画质/音质，不下载
    #[arg(long)]
    pub list_qualities: bool,

    /// 以 JSON 输出最终的任务状态
    #[arg(long)]
    pub json: bool,

    /// 显示调试日志
    #[arg(short, long)]
    pub verbose: bool,
}
