mod agent;
mod config;
mod generator;
mod llm;
mod parser;
mod pipeline;
mod storage;
mod utils;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use agent::LiteratureAgent;
use config::{AppConfig, KeywordConfig, KEYWORDS_PATH, SETTINGS_PATH};
use llm::LlmClient;
use parser::{LocalPdfParser, ParsedLayout};
use pipeline::{CorpusAggregator, DocumentProcessor};
use utils::logger;

#[derive(Parser)]
#[command(name = "pilmine")]
#[command(about = "聚离子液体文献结构-性质数据提取系统", long_about = None)]
struct Cli {
    /// 输出调试日志
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 初始化目录和默认配置文件
    Init,
    /// 查看配置状态
    Status,
    /// 本地解析 PDF 为文档目录（正文 + 图片）
    Parse {
        #[arg(long)]
        pdf: PathBuf,
        /// 输出根目录，默认为 pipeline.base_dir
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// 对已解析的文档目录运行结构-性质提取
    Extract {
        #[arg(long)]
        base_dir: Option<PathBuf>,
        /// 处理完成后不生成合并数据库
        #[arg(long)]
        no_merge: bool,
    },
    /// 合并所有单篇结果为一个数据库文件
    Merge {
        #[arg(long)]
        base_dir: Option<PathBuf>,
    },
    /// 按自定义需求提取信息并生成思维导图
    Agent {
        #[command(subcommand)]
        mode: AgentCommand,
    },
}

#[derive(Subcommand)]
enum AgentCommand {
    /// 处理单篇文档
    Single {
        /// 已解析的文档目录
        #[arg(long, conflicts_with = "pdf", required_unless_present = "pdf")]
        doc: Option<PathBuf>,
        #[arg(long)]
        pdf: Option<PathBuf>,
        /// 想从文献中提取的信息
        #[arg(short, long)]
        requirements: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// 批量处理
    Batch {
        /// 包含多个文档目录的根目录
        #[arg(long, conflicts_with = "pdf_dir", required_unless_present = "pdf_dir")]
        dir: Option<PathBuf>,
        /// 包含 PDF 文件的目录
        #[arg(long)]
        pdf_dir: Option<PathBuf>,
        #[arg(short, long)]
        requirements: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logger::init_logger(cli.verbose);
    info!("pilmine 启动");

    match cli.command {
        Commands::Init => {
            init_command().await?;
        }
        Commands::Status => {
            status_command()?;
        }
        Commands::Parse { pdf, out } => {
            parse_command(&pdf, out)?;
        }
        Commands::Extract { base_dir, no_merge } => {
            extract_command(base_dir, no_merge).await?;
        }
        Commands::Merge { base_dir } => {
            merge_command(base_dir)?;
        }
        Commands::Agent { mode } => {
            agent_command(mode).await?;
        }
    }

    Ok(())
}

async fn init_command() -> Result<()> {
    info!("初始化系统...");

    let app_config = AppConfig::default();
    tokio::fs::create_dir_all(&app_config.pipeline.base_dir).await?;
    tokio::fs::create_dir_all(&app_config.agent.output_dir).await?;
    tokio::fs::create_dir_all("config").await?;

    if Path::new(SETTINGS_PATH).exists() {
        info!("配置文件已存在，保留: {}", SETTINGS_PATH);
    } else {
        app_config.save(SETTINGS_PATH)?;
        info!("已生成配置文件: {}", SETTINGS_PATH);
    }

    if Path::new(KEYWORDS_PATH).exists() {
        info!("关键词配置已存在，保留: {}", KEYWORDS_PATH);
    } else {
        let keyword_toml = toml::to_string_pretty(&KeywordConfig::default())?;
        tokio::fs::write(KEYWORDS_PATH, keyword_toml).await?;
        info!("已生成关键词配置: {}", KEYWORDS_PATH);
    }

    info!("✅ 系统初始化完成！");
    info!("下一步:");
    info!("  1. 编辑 {} 配置 API 密钥", SETTINGS_PATH);
    info!("  2. 运行 'pilmine parse --pdf <文件>' 或把解析结果放到 {}", app_config.pipeline.base_dir);
    info!("  3. 运行 'pilmine extract' 开始提取");

    Ok(())
}

fn status_command() -> Result<()> {
    let app_config = AppConfig::load()?;
    for line in app_config.status_lines() {
        info!("{}", line);
    }

    let missing = app_config.missing_keys();
    if missing.is_empty() {
        info!("✅ 配置完整");
    } else {
        warn!("⚠️ 缺失配置: {}", missing.join(", "));
    }
    Ok(())
}

fn parse_command(pdf: &Path, out: Option<PathBuf>) -> Result<()> {
    let app_config = AppConfig::load()?;
    let out = out.unwrap_or_else(|| PathBuf::from(&app_config.pipeline.base_dir));

    let parser = LocalPdfParser::new(ParsedLayout::from_config(&app_config.parser));
    let doc_dir = parser.parse(pdf, &out)?;
    info!("✅ 解析完成: {}", doc_dir.display());
    Ok(())
}

/// 加载配置并确认大模型可用
fn load_llm() -> Result<(AppConfig, LlmClient)> {
    let app_config = AppConfig::load()?;
    app_config.require_llm_credentials()?;
    let llm = LlmClient::from_config(&app_config.llm)?;
    Ok((app_config, llm))
}

async fn extract_command(base_dir: Option<PathBuf>, no_merge: bool) -> Result<()> {
    let (app_config, llm) = load_llm()?;
    let keyword_config = KeywordConfig::load()?;
    let base_dir = base_dir.unwrap_or_else(|| PathBuf::from(&app_config.pipeline.base_dir));

    info!("🚀 开始结构-性质提取: {}", base_dir.display());
    let processor = DocumentProcessor::new(llm, &app_config, keyword_config);
    let summary = processor
        .process_all(&base_dir)
        .await
        .with_context(|| format!("无法读取文档目录: {}", base_dir.display()))?;

    if no_merge {
        return Ok(());
    }
    if summary.has_outputs() {
        CorpusAggregator::from_config(&app_config.pipeline).aggregate(&base_dir)?;
    } else {
        warn!("⚠️ 没有可合并的结果");
    }
    Ok(())
}

fn merge_command(base_dir: Option<PathBuf>) -> Result<()> {
    let app_config = AppConfig::load()?;
    let base_dir = base_dir.unwrap_or_else(|| PathBuf::from(&app_config.pipeline.base_dir));
    CorpusAggregator::from_config(&app_config.pipeline).aggregate(&base_dir)?;
    Ok(())
}

async fn agent_command(mode: AgentCommand) -> Result<()> {
    let (app_config, llm) = load_llm()?;
    let layout = ParsedLayout::from_config(&app_config.parser);
    let agent = LiteratureAgent::new(llm, &app_config);

    match mode {
        AgentCommand::Single {
            doc,
            pdf,
            requirements,
            output,
        } => {
            let output = output.unwrap_or_else(|| PathBuf::from(&app_config.agent.output_dir));
            let doc_dir = match (doc, pdf) {
                (Some(doc), _) => doc,
                (None, Some(pdf)) => {
                    info!("📄 解析PDF文件: {}", pdf.display());
                    LocalPdfParser::new(layout).parse(&pdf, &output.join("parsed"))?
                }
                (None, None) => anyhow::bail!("需要 --doc 或 --pdf"),
            };

            let result_dir = agent.process_single(&doc_dir, &requirements, &output).await?;
            info!("🎉 处理成功! 结果目录: {}", result_dir.display());
        }
        AgentCommand::Batch {
            dir,
            pdf_dir,
            requirements,
            output,
        } => {
            let output = output.unwrap_or_else(|| PathBuf::from(&app_config.agent.output_dir));
            let doc_dirs = match (dir, pdf_dir) {
                (Some(dir), _) => layout
                    .document_dirs(&dir)
                    .with_context(|| format!("无法读取目录: {}", dir.display()))?,
                (None, Some(pdf_dir)) => parse_pdf_dir(&layout, &pdf_dir, &output.join("parsed"))?,
                (None, None) => anyhow::bail!("需要 --dir 或 --pdf-dir"),
            };

            if doc_dirs.is_empty() {
                warn!("❌ 没有找到可处理的文档");
                return Ok(());
            }

            let outcome = agent.process_batch(&doc_dirs, &requirements, &output).await?;
            info!("🎉 批量处理完成! 成功 {}/{}", outcome.processed, outcome.total);
            info!("📁 报告目录: {}", outcome.report_dir.display());
        }
    }

    Ok(())
}

/// 解析目录下所有 PDF，解析失败的文件跳过
fn parse_pdf_dir(layout: &ParsedLayout, pdf_dir: &Path, out: &Path) -> Result<Vec<PathBuf>> {
    let mut pdfs: Vec<PathBuf> = std::fs::read_dir(pdf_dir)
        .with_context(|| format!("无法读取目录: {}", pdf_dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
        })
        .collect();
    pdfs.sort();
    info!("发现 {} 个PDF文件", pdfs.len());

    let parser = LocalPdfParser::new(layout.clone());
    let mut doc_dirs = Vec::new();
    for pdf in &pdfs {
        match parser.parse(pdf, out) {
            Ok(dir) => doc_dirs.push(dir),
            Err(e) => warn!("❌ 解析失败 {}: {:#}", pdf.display(), e),
        }
    }
    Ok(doc_dirs)
}
