/*
dailybrief - main.rs
Runs one briefing: fetch today's headlines, summarize them, fact-check every summary bullet,
then deliver the report by email and/or chat webhook and print it to stdout.
Scheduling is left to the caller (cron, systemd timer, ...).
*/

use anyhow::{Context, Result};
use clap::Parser;
use common::Config;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use dailybrief::delivery::smtp::{SmtpMailer, DEFAULT_SMTP_PORT};
use dailybrief::delivery::webhook::SlackWebhook;
use dailybrief::delivery::Delivery;
use dailybrief::evaluator::{EvalSink, HttpEvaluator, LogEvaluator, DEFAULT_QUEUE_SIZE};
use dailybrief::llm::remote::RemoteLlmProvider;
use dailybrief::llm::LlmProvider;
use dailybrief::news::{FeedNewsSource, NewsApiSource, NewsSource, NEWSAPI_TOP_HEADLINES_URL};
use dailybrief::search::{DuckDuckGoSearch, SearchProvider, DUCKDUCKGO_HTML_URL};
use dailybrief::verify::DEFAULT_EVIDENCE_CHARS;
use dailybrief::{run_briefing, Pipeline, PipelineOptions};

const DEFAULT_SUBJECT: &str = "Daily Briefing";

#[derive(Parser, Debug)]
#[command(name = "dailybrief", about = "Fetch, summarize and fact-check today's top headlines")]
struct Args {
    /// Path to config.toml
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override log level (info, debug, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Print the report without emailing or posting it
    #[arg(long)]
    no_deliver: bool,

    /// Override news region (e.g. "us")
    #[arg(long)]
    region: Option<String>,

    /// Override number of headlines
    #[arg(long)]
    count: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI args
    let args = Args::parse();

    // Initialize logging; stdout is reserved for the report
    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    // Resolve config paths
    let default_path = PathBuf::from("config.default.toml");

    let override_path = if let Some(p) = args.config.clone() {
        if !p.exists() {
            error!(path = ?p, "specified config file not found");
            return Err(anyhow::anyhow!("Config file not found: {}", p.display()));
        }
        Some(p)
    } else {
        let p = PathBuf::from("config.toml");
        if p.exists() { Some(p) } else { None }
    };

    // Load configuration with defaults
    let mut config = match Config::load_with_defaults(
        if default_path.exists() { Some(&default_path) } else { None },
        override_path.as_deref(),
    )
    .await
    {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(%e, "failed to load configuration");
            return Err(e);
        }
    };
    info!(default = ?default_path, override = ?override_path, "configuration loaded");

    if let Some(region) = args.region.clone() {
        config.news.region = Some(region);
    }
    if let Some(count) = args.count {
        config.news.count = Some(count);
    }

    // Collaborators
    let news = create_news_source(&config).context("failed to initialize news source")?;
    let search = create_search_provider(&config).context("failed to initialize search provider")?;
    let llm = create_llm_provider(&config.llm).context("failed to initialize LLM provider")?;
    let (eval_sink, eval_worker) = create_eval_sink(&config);
    let delivery = if args.no_deliver {
        info!("Delivery disabled via CLI (--no-deliver)");
        Delivery::new()
    } else {
        create_delivery(&config)
    };

    let options = PipelineOptions {
        region: config.region().to_string(),
        headline_count: config.headline_count(),
        verify_concurrency: config.verify_concurrency(),
        call_timeout: Duration::from_secs(config.call_timeout_seconds()),
        evidence_chars: config.search.evidence_chars.unwrap_or(DEFAULT_EVIDENCE_CHARS),
    };
    let pipeline = Pipeline::new(news, search, llm, options).with_eval_sink(eval_sink);

    // Cancel the run on CTRL-C; the partial state is discarded
    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, cancelling briefing run");
            ctrl_c_cancel.cancel();
        }
    });

    let subject_prefix = config
        .email
        .as_ref()
        .and_then(|e| e.subject.clone())
        .unwrap_or_else(|| DEFAULT_SUBJECT.to_string());
    let outcome = run_briefing(&pipeline, &delivery, &subject_prefix, &cancel).await;

    // Dropping the pipeline closes the evaluator queue; give the worker a moment to flush
    drop(pipeline);
    if let Some(handle) = eval_worker {
        if tokio::time::timeout(Duration::from_secs(5), handle).await.is_err() {
            info!("Timed out waiting for evaluator to flush; continuing shutdown");
        }
    }

    let briefing = match outcome {
        Ok(briefing) => briefing,
        Err(e) => {
            error!(%e, "briefing run failed; nothing delivered");
            return Err(e.into());
        }
    };
    if briefing.delivery.failed > 0 {
        warn!(failed = briefing.delivery.failed, "some delivery channels failed; report printed below");
    }

    println!("{}", briefing.report);
    Ok(())
}

fn create_news_source(config: &Config) -> Result<Arc<dyn NewsSource>> {
    let news = &config.news;
    let timeout_secs = news.timeout_seconds.unwrap_or(10);
    let adapter = news.adapter.as_deref().unwrap_or("newsapi");

    match adapter {
        "newsapi" => {
            let api_key_env = news.api_key_env.as_deref().unwrap_or("NEWS_API_KEY");
            let api_key = std::env::var(api_key_env)
                .with_context(|| format!("News API key env var '{}' not set", api_key_env))?;
            let api_url = news.api_url.as_deref().unwrap_or(NEWSAPI_TOP_HEADLINES_URL);
            info!(api_url, "Using NewsAPI news source");
            Ok(Arc::new(NewsApiSource::new(api_url, api_key, timeout_secs)?))
        }
        "feeds" => {
            if news.feeds.is_empty() {
                anyhow::bail!("News adapter 'feeds' selected but [news.feeds] is empty");
            }
            info!(regions = ?news.feeds.keys().collect::<Vec<_>>(), "Using RSS/Atom news source");
            Ok(Arc::new(FeedNewsSource::new(news.feeds.clone(), timeout_secs)?))
        }
        _ => anyhow::bail!("Unknown news adapter type: {}", adapter),
    }
}

fn create_search_provider(config: &Config) -> Result<Arc<dyn SearchProvider>> {
    let search = &config.search;
    let endpoint = search.endpoint.as_deref().unwrap_or(DUCKDUCKGO_HTML_URL);
    let provider = DuckDuckGoSearch::new(
        endpoint,
        search.max_results.unwrap_or(5),
        search.timeout_seconds.unwrap_or(15),
    )?;
    Ok(Arc::new(provider))
}

/// Create the remote LLM provider; the API key is read from the env var named in config
fn create_llm_provider(llm_config: &common::LlmConfig) -> Result<Arc<dyn LlmProvider>> {
    let api_key = match llm_config.api_key_env.as_deref() {
        Some(api_key_env) => std::env::var(api_key_env)
            .with_context(|| format!("LLM API key env var '{}' not set", api_key_env))?,
        None => {
            warn!("No llm.api_key_env configured; sending requests without an API key");
            String::new()
        }
    };

    let model = llm_config.model.clone().unwrap_or_else(|| "gpt-4o-mini".to_string());
    let api_url = llm_config
        .api_url
        .clone()
        .unwrap_or_else(|| "http://localhost:11434/v1/chat/completions".to_string());

    info!(model = %model, api_url = %api_url, "LLM provider initialized");

    let provider = RemoteLlmProvider::new(api_url, api_key, model).with_defaults(
        llm_config.timeout_seconds.unwrap_or(60),
        llm_config.max_tokens.unwrap_or(1000),
        llm_config.temperature.unwrap_or(0.7),
    );
    Ok(Arc::new(provider))
}

fn create_eval_sink(config: &Config) -> (EvalSink, Option<JoinHandle<()>>) {
    let eval = &config.evaluator;
    let queue_size = eval.queue_size.unwrap_or(DEFAULT_QUEUE_SIZE);

    match eval.adapter.as_deref().unwrap_or("none") {
        "log" => {
            let (sink, handle) = EvalSink::spawn(Arc::new(LogEvaluator), queue_size);
            (sink, Some(handle))
        }
        "http" => {
            let Some(endpoint) = eval.endpoint.as_deref() else {
                warn!("Evaluator adapter 'http' selected but no endpoint configured; scoring disabled");
                return (EvalSink::disabled(), None);
            };
            match HttpEvaluator::new(endpoint) {
                Ok(evaluator) => {
                    let (sink, handle) = EvalSink::spawn(Arc::new(evaluator), queue_size);
                    (sink, Some(handle))
                }
                Err(e) => {
                    warn!(error = %e, "Failed to initialize HTTP evaluator; scoring disabled");
                    (EvalSink::disabled(), None)
                }
            }
        }
        "none" => (EvalSink::disabled(), None),
        other => {
            warn!(adapter = other, "Unknown evaluator adapter; scoring disabled");
            (EvalSink::disabled(), None)
        }
    }
}

/// Build delivery channels; a misconfigured channel is logged and skipped
fn create_delivery(config: &Config) -> Delivery {
    let mut delivery = Delivery::new();

    if let Some(email) = &config.email {
        let password = email
            .password_env
            .as_deref()
            .map(std::env::var)
            .transpose();
        match password {
            Ok(password) => {
                match SmtpMailer::new(
                    &email.smtp_server,
                    email.smtp_port.unwrap_or(DEFAULT_SMTP_PORT),
                    &email.address,
                    &password.unwrap_or_default(),
                    email.timeout_seconds.unwrap_or(30),
                ) {
                    Ok(mailer) => {
                        let to = email.to.clone().unwrap_or_else(|| email.address.clone());
                        info!(server = %email.smtp_server, to = %to, "Email delivery enabled");
                        delivery = delivery.with_email(Box::new(mailer), to);
                    }
                    Err(e) => error!(%e, "Failed to initialize SMTP mailer; email delivery disabled"),
                }
            }
            Err(e) => error!(%e, "SMTP password env var not set; email delivery disabled"),
        }
    }

    if let Some(webhook) = &config.webhook {
        let url = match webhook.url_env.as_deref() {
            Some(var) => std::env::var(var).ok(),
            None => webhook.url.clone(),
        };
        match url {
            Some(url) => match SlackWebhook::new(url) {
                Ok(hook) => {
                    info!("Chat webhook delivery enabled");
                    delivery = delivery.with_webhook(Box::new(hook));
                }
                Err(e) => error!(error = %e, "Failed to initialize chat webhook; webhook delivery disabled"),
            },
            None => warn!("Webhook configured without a URL; webhook delivery disabled"),
        }
    }

    delivery
}
