use anyhow::Context;
use clap::Parser;
use persona_scope::config::{AnalyzeArgs, Command, LogFormat};
use persona_scope::core::loader;
use persona_scope::utils::error::AnalysisError;
use persona_scope::utils::{logger, validation::Validate};
use persona_scope::{AnalysisHandle, CliConfig, GeminiConnector, LocalStorage, RunOutcome};

/// 使用者以 Ctrl-C 中止時的退出碼
const EXIT_CANCELLED: i32 = 130;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CliConfig::parse();

    // 初始化日誌
    match config.log_format {
        LogFormat::Text => logger::init_cli_logger(config.verbose),
        LogFormat::Json => logger::init_json_logger(config.verbose),
    }

    tracing::info!("Starting persona-scope CLI");
    if config.verbose {
        tracing::debug!("CLI config: {:?}", config);
    }

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        fail(&e);
    }

    match &config.command {
        Command::Headers { input } => {
            let headers = loader::peek_headers(input)
                .with_context(|| format!("reading headers of {}", input.display()))?;
            for header in &headers {
                println!("{}", header);
            }

            let (fullname, username) = loader::suggest_columns(&headers);
            println!();
            println!("Suggested full name column: {}", fullname.as_deref().unwrap_or("-"));
            println!("Suggested username column:  {}", username.as_deref().unwrap_or("-"));
            Ok(())
        }
        Command::Analyze(args) => analyze(args, config.log_format).await,
    }
}

async fn analyze(args: &AnalyzeArgs, log_format: LogFormat) -> anyhow::Result<()> {
    let (pipeline_config, settings) = match args.load_toml().and_then(|file| args.resolve(file.as_ref())) {
        Ok(resolved) => resolved,
        Err(e) => fail(&e),
    };

    tracing::info!(
        "📝 Input: {} (full name: '{}', username: '{}')",
        pipeline_config.input_path.display(),
        pipeline_config.fullname_column,
        pipeline_config.username_column
    );

    let connector = GeminiConnector::new(settings.clone());
    let handle =
        AnalysisHandle::spawn(connector, LocalStorage::default(), pipeline_config, settings);

    // 進度由 tracing 輸出；這裡只負責 Ctrl-C
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("🛑 Stop requested, finishing the current row");
    };

    match handle.drive(interrupt).await {
        // JSON 模式下 stdout 只有日誌行；完成訊息已由引擎記錄
        RunOutcome::Completed(_) if log_format == LogFormat::Json => Ok(()),
        RunOutcome::Completed(summary) => {
            println!("✅ Analysis complete!");
            println!("📁 Output saved to: {}", summary.output_path.display());
            if summary.failed_rows > 0 {
                println!(
                    "⚠️ {} of {} rows could not be analyzed, see the 'error' column",
                    summary.failed_rows, summary.total_rows
                );
            }
            Ok(())
        }
        RunOutcome::Cancelled => {
            eprintln!("🛑 Analysis stopped by user. No output was written.");
            std::process::exit(EXIT_CANCELLED);
        }
        RunOutcome::Failed { message, severity } => {
            eprintln!("❌ {}", message);
            std::process::exit(severity.exit_code());
        }
    }
}

fn fail(e: &AnalysisError) -> ! {
    tracing::error!(
        "❌ {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    // 輸出用戶友好的錯誤信息
    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 {}", e.recovery_suggestion());

    // 根據錯誤嚴重程度決定退出碼
    std::process::exit(e.severity().exit_code());
}
