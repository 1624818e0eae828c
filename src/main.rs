//! 命令行入口
//!
//! ```bash
//! jobproof <职位 URL> <简历文件>
//! ```
//!
//! 退出码：0 = 校验通过，1 = 校验未通过，2 = 运行出错。

use std::path::Path;
use std::process::ExitCode;

use tracing::error;

use jobproof::app::App;
use jobproof::logger;

#[tokio::main]
async fn main() -> ExitCode {
    logger::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() != 3 {
        eprintln!("用法: {} <职位 URL> <简历文件>", args.first().map(String::as_str).unwrap_or("jobproof"));
        return ExitCode::from(2);
    }
    let job_url = &args[1];
    let resume_path = Path::new(&args[2]);

    let app = match App::initialize() {
        Ok(app) => app,
        Err(e) => {
            error!("❌ 初始化失败: {:#}", e);
            return ExitCode::from(2);
        }
    };

    match app.run(job_url, resume_path).await {
        Ok(result) if result.passed() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(1),
        Err(e) => {
            error!("❌ 运行失败: {:#}", e);
            ExitCode::from(2)
        }
    }
}
