use clap::{Parser, Subcommand};
use comfyui_post_relay::flows::{GenerateImageRequest, QueuePromptRequest};
use comfyui_post_relay::prompt::PostRequest;
use comfyui_post_relay::trends::{NewsResponse, TrendsQuery};
use comfyui_post_relay::workflow::graph::load_graph;
use comfyui_post_relay::{Config, Relay};
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "relayctl", about = "CLI for the ComfyUI post relay", version)]
struct Cli {
    /// Override COMFYUI_URL
    #[arg(global = true, long)]
    comfyui_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Queue a workflow prompt to ComfyUI
    Queue {
        /// Workflow name under prompts/<name>.json
        #[arg(long, conflicts_with = "file")]
        workflow: Option<String>,
        /// Explicit file path to a workflow JSON
        #[arg(long, value_name = "PATH")]
        file: Option<PathBuf>,
        /// Dynamic overrides as key=value (repeatable). Key is a path like
        /// `3.inputs.seed` or `prompt.3.inputs.seed`.
        #[arg(long = "set", value_name = "KEY=VALUE")]
        sets: Vec<String>,
        /// Default filename prefix for SaveImage nodes without one
        #[arg(long)]
        filename_prefix: Option<String>,
        /// Positive prompt text; routed via KSampler links when possible
        #[arg(long, value_name = "TEXT")]
        text_positive: Option<String>,
        /// Negative prompt text; routed via KSampler links when possible
        #[arg(long, value_name = "TEXT")]
        text_negative: Option<String>,
        #[arg(long)]
        seed: Option<i64>,
        #[arg(long)]
        steps: Option<i64>,
        #[arg(long)]
        cfg: Option<f64>,
        #[arg(long)]
        ckpt_name: Option<String>,
        /// Log the constructed request body before sending
        #[arg(short, long)]
        verbose: bool,
    },
    /// Fetch ComfyUI execution history
    History {
        /// Filter by prompt ID to list output filenames
        #[arg(long)]
        prompt_id: Option<String>,
        /// Pretty-print full JSON history
        #[arg(long)]
        pretty: bool,
    },
    /// Image operations
    Image {
        #[command(subcommand)]
        cmd: ImageCmd,
    },
    /// Assemble, refine and render a post image
    Generate {
        /// One of festival, product_launch, event, achievement, hiring, trending
        #[arg(long)]
        post_type: String,
        /// Post fields as key=value (repeatable), e.g. `festival_name=Diwali`.
        /// `tags`/`keywords` take comma-separated lists, JSON values are parsed.
        #[arg(long = "field", value_name = "KEY=VALUE")]
        fields: Vec<String>,
        /// Only print the generated prompt pair, don't render
        #[arg(long)]
        prompt_only: bool,
        /// Output path (defaults to ./<filename>)
        #[arg(long, value_name = "PATH")]
        out: Option<PathBuf>,
    },
    /// Check the realtime connection to ComfyUI
    Connect {
        #[arg(long)]
        server_address: Option<String>,
    },
    /// Look up news trends
    Trends {
        /// Free-text topic; top headlines for --category when absent
        #[arg(long)]
        topic: Option<String>,
        #[arg(long, default_value = "WORLD")]
        category: String,
        #[arg(long, default_value = "en")]
        lang: String,
        #[arg(long, default_value = "WORLD")]
        country: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

#[derive(Subcommand, Debug)]
enum ImageCmd {
    /// Download an image by filename
    Get {
        /// Filename reported by ComfyUI (e.g. in history)
        filename: String,
        /// Output path (defaults to ./<filename>)
        #[arg(long, value_name = "PATH")]
        out: Option<PathBuf>,
    },
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();
    Config::dotenv_load();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> CliResult {
    let mut conf = Config::new()?;
    if let Some(url) = cli.comfyui_url {
        conf.comfyui_url = url;
    }
    let relay = Relay::from_config(&conf).await;

    match cli.command {
        Commands::Queue {
            workflow, file, sets, filename_prefix,
            text_positive, text_negative,
            seed, steps, cfg, ckpt_name,
            verbose,
        } => {
            let workflow_data = match (&workflow, file) {
                (None, Some(path)) => Some(load_graph(&path).await?),
                (Some(_), None) => None,
                _ => return Err("Must provide either --workflow <name> or --file <path>".into()),
            };

            let mut params = Map::new();
            if let Some(v) = seed { params.insert("seed".into(), Value::from(v)); }
            if let Some(v) = steps { params.insert("steps".into(), Value::from(v)); }
            if let Some(v) = cfg { params.insert("cfg".into(), json!(v)); }
            if let Some(v) = ckpt_name { params.insert("ckpt_name".into(), Value::String(v)); }

            let request = QueuePromptRequest {
                workflow_data,
                workflow,
                text_positive,
                text_negative,
                sets,
                filename_prefix,
                verbose,
                params,
                ..Default::default()
            };
            let submission = relay.queue_prompt(&request).await?;
            println!("{}", serde_json::to_string_pretty(&submission.raw)?);
            Ok(())
        }
        Commands::History { prompt_id, pretty } => {
            let hist = relay.history(None).await?;
            if let Some(id) = prompt_id {
                let mut files: Vec<String> = Vec::new();
                if let Some(entry) = hist.get(&id) {
                    collect_filenames(entry, &mut files);
                }
                if files.is_empty() {
                    eprintln!("No filenames found for prompt_id={}", id);
                } else {
                    for f in files { println!("{}", f); }
                }
            } else if pretty {
                println!("{}", serde_json::to_string_pretty(&hist)?);
            } else {
                println!("{}", serde_json::to_string(&hist)?);
            }
            Ok(())
        }
        Commands::Image { cmd: ImageCmd::Get { filename, out } } => {
            let artifact = relay.image(&filename, None).await?;
            let path = out.unwrap_or_else(|| PathBuf::from(&artifact.filename));
            tokio::fs::write(&path, &artifact.bytes).await?;
            println!("Saved {} ({} bytes)", path.display(), artifact.bytes.len());
            Ok(())
        }
        Commands::Generate { post_type, fields, prompt_only, out } => {
            let post = post_request(&post_type, &fields)?;
            if prompt_only {
                let generated = relay.generate_prompt(&post).await?;
                println!("{}", generated.generated_prompt);
                return Ok(());
            }
            let artifact = relay
                .generate_image(GenerateImageRequest { workflow_data: None, post })
                .await?;
            let path = out.unwrap_or_else(|| PathBuf::from(&artifact.filename));
            tokio::fs::write(&path, &artifact.bytes).await?;
            println!("Saved {} ({} bytes)", path.display(), artifact.bytes.len());
            Ok(())
        }
        Commands::Connect { server_address } => {
            let info = relay.connect_check(server_address.as_deref()).await?;
            println!("{} (client_id={}, server={})", info.message, info.client_id, info.server_address);
            Ok(())
        }
        Commands::Trends { topic, category, lang, country, limit } => {
            let query = TrendsQuery { category, lang, country, limit };
            let news = match topic {
                Some(topic) => relay.trends_by_topic(&topic, &query).await?,
                None => relay.trends(&query).await?,
            };
            print_news(&news);
            Ok(())
        }
    }
}

/// Build a `PostRequest` from `--field key=value` pairs.
fn post_request(post_type: &str, fields: &[String]) -> Result<PostRequest, Box<dyn std::error::Error>> {
    let mut body = Map::new();
    body.insert("post_type".into(), Value::String(post_type.to_string()));
    for item in fields {
        let (key, raw) = item
            .split_once('=')
            .ok_or_else(|| format!("Invalid field '{}', expected KEY=VALUE", item))?;
        let value = match serde_json::from_str::<Value>(raw) {
            Ok(parsed @ (Value::Array(_) | Value::Object(_))) => parsed,
            _ if key == "tags" || key == "keywords" => {
                Value::from(raw.split(',').map(|s| s.trim().to_string()).collect::<Vec<_>>())
            }
            _ => Value::String(raw.to_string()),
        };
        body.insert(key.to_string(), value);
    }
    Ok(serde_json::from_value(Value::Object(body))?)
}

fn print_news(news: &NewsResponse) {
    println!("{}", news.feed_title);
    for article in &news.articles {
        println!("- {} ({}, {})\n  {}", article.title, article.source, article.published, article.link);
    }
}

fn collect_filenames(v: &Value, out: &mut Vec<String>) {
    match v {
        Value::Object(map) => {
            for (k, vv) in map.iter() {
                if k == "filename" {
                    if let Value::String(s) = vv { out.push(s.clone()); }
                }
                collect_filenames(vv, out);
            }
        }
        Value::Array(arr) => {
            for vv in arr { collect_filenames(vv, out); }
        }
        _ => {}
    }
}
