use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use recraft_contracts::events::{EventDetails, EventLog};
use recraft_contracts::nodes::{
    BACKGROUND_REMOVER_NODE, BACKGROUND_REPLACER_NODE, CLARITY_UPSCALER_NODE, CLIENT_NODE,
    CREATIVE_UPSCALER_NODE, CRISP_UPSCALER_NODE, GENERATIVE_UPSCALER_NODE, IMAGE_GENERATOR_NODE,
    IMAGE_TO_IMAGE_NODE, INPAINTER_NODE, NODE_SPECS,
};
use recraft_engine::codec::{decode_image, encode_image, mask_from_image};
use recraft_engine::{
    default_node_registry, node_inputs, run_node, NodeContext, NodeInputs, NodeValue,
    RecraftClient, RecraftConfig, Registry,
};
use serde_json::Value;

#[derive(Debug, Parser)]
#[command(name = "recraft-rs", version, about = "Recraft image API from the command line")]
struct Cli {
    /// TOML file with an [API] table; defaults to $RECRAFT_CONFIG or ./config.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Overrides the token from the config file and environment.
    #[arg(long, global = true)]
    token: Option<String>,
    /// Append node events to this JSONL file.
    #[arg(long, global = true)]
    events: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Nodes(NodesArgs),
    Generate(GenerateArgs),
    ImageToImage(ImageToImageArgs),
    RemoveBackground(SingleImageArgs),
    ReplaceBackground(EditArgs),
    Inpaint(InpaintArgs),
    Upscale(UpscaleArgs),
}

#[derive(Debug, Parser)]
struct NodesArgs {
    /// Print the host schema instead of a table.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Parser)]
struct StyleArgs {
    #[arg(long, default_value = "")]
    style: String,
    #[arg(long, default_value = "")]
    substyle: String,
    #[arg(long, default_value_t = 0)]
    seed: i64,
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    #[arg(long)]
    prompt: String,
    #[arg(long)]
    out: PathBuf,
    #[arg(long, default_value = "")]
    size: String,
    #[arg(long, default_value = "")]
    model: String,
    #[command(flatten)]
    style: StyleArgs,
}

#[derive(Debug, Parser)]
struct ImageToImageArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    prompt: String,
    #[arg(long)]
    out: PathBuf,
    #[arg(long, default_value_t = 0.5)]
    strength: f64,
    #[command(flatten)]
    style: StyleArgs,
}

#[derive(Debug, Parser)]
struct EditArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    prompt: String,
    #[arg(long)]
    out: PathBuf,
    #[command(flatten)]
    style: StyleArgs,
}

#[derive(Debug, Parser)]
struct InpaintArgs {
    #[arg(long)]
    mask: PathBuf,
    #[command(flatten)]
    edit: EditArgs,
}

#[derive(Debug, Parser)]
struct SingleImageArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    out: PathBuf,
    #[arg(long, default_value_t = 0)]
    seed: i64,
}

#[derive(Debug, Parser)]
struct UpscaleArgs {
    #[arg(long, value_enum, default_value_t = Flavor::Crisp)]
    flavor: Flavor,
    #[command(flatten)]
    target: SingleImageArgs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Flavor {
    Crisp,
    Creative,
    Clarity,
    Generative,
}

impl Flavor {
    fn node_id(self) -> &'static str {
        match self {
            Flavor::Crisp => CRISP_UPSCALER_NODE,
            Flavor::Creative => CREATIVE_UPSCALER_NODE,
            Flavor::Clarity => CLARITY_UPSCALER_NODE,
            Flavor::Generative => GENERATIVE_UPSCALER_NODE,
        }
    }
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("recraft-rs error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    if let Command::Nodes(args) = &cli.command {
        print_nodes(args.json)?;
        return Ok(0);
    }

    let config = RecraftConfig::load(cli.config.as_deref())?;
    for warning in config.warnings() {
        eprintln!("warning: {warning}");
    }
    let mut ctx =
        NodeContext::new(config).with_progress(|message, url| println!("{message} {url}"));
    if let Some(path) = cli.events.as_ref() {
        let events = EventLog::new(path, uuid::Uuid::new_v4().to_string());
        events.record("session_started", "recraft-rs", session_details(&cli.command))?;
        ctx = ctx.with_events(events);
    }
    let registry = default_node_registry()?;
    let client = make_client(&registry, &ctx, cli.token.as_deref())?;

    let (node, inputs, out) = plan(cli.command, client)?;
    let image = run_node(&registry, &ctx, node, &inputs)?.into_image()?;
    let bytes = encode_image(image.view())?;
    fs::write(&out, bytes).with_context(|| format!("failed writing {}", out.display()))?;
    println!("Saved {}", out.display());
    Ok(0)
}

fn session_details(command: &Command) -> EventDetails {
    let mut details = EventDetails::new();
    details.insert(
        "command".to_string(),
        Value::String(command_name(command).to_string()),
    );
    details
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Nodes(_) => "nodes",
        Command::Generate(_) => "generate",
        Command::ImageToImage(_) => "image-to-image",
        Command::RemoveBackground(_) => "remove-background",
        Command::ReplaceBackground(_) => "replace-background",
        Command::Inpaint(_) => "inpaint",
        Command::Upscale(_) => "upscale",
    }
}

fn make_client(registry: &Registry, ctx: &NodeContext, token: Option<&str>) -> Result<RecraftClient> {
    let inputs = node_inputs([("api_token", token.unwrap_or_default().into())]);
    run_node(registry, ctx, CLIENT_NODE, &inputs)?.into_client()
}

/// Picks the node for a subcommand and gathers its inputs.
fn plan(command: Command, client: RecraftClient) -> Result<(&'static str, NodeInputs, PathBuf)> {
    let mut inputs = node_inputs([("client", client.into())]);
    let (node, out) = match command {
        Command::Nodes(_) => anyhow::bail!("nodes does not run a node"),
        Command::Generate(args) => {
            inputs.insert("prompt".to_string(), args.prompt.into());
            inputs.insert("image_size".to_string(), args.size.into());
            inputs.insert("model".to_string(), args.model.into());
            insert_style(&mut inputs, args.style);
            (IMAGE_GENERATOR_NODE, args.out)
        }
        Command::ImageToImage(args) => {
            inputs.insert("image".to_string(), read_image(&args.image)?);
            inputs.insert("prompt".to_string(), args.prompt.into());
            inputs.insert("strength".to_string(), args.strength.into());
            insert_style(&mut inputs, args.style);
            (IMAGE_TO_IMAGE_NODE, args.out)
        }
        Command::RemoveBackground(args) => {
            inputs.insert("image".to_string(), read_image(&args.image)?);
            inputs.insert("seed".to_string(), args.seed.into());
            (BACKGROUND_REMOVER_NODE, args.out)
        }
        Command::ReplaceBackground(args) => {
            insert_edit(&mut inputs, &args)?;
            insert_style(&mut inputs, args.style);
            (BACKGROUND_REPLACER_NODE, args.out)
        }
        Command::Inpaint(args) => {
            inputs.insert("mask".to_string(), read_mask(&args.mask)?);
            insert_edit(&mut inputs, &args.edit)?;
            insert_style(&mut inputs, args.edit.style);
            (INPAINTER_NODE, args.edit.out)
        }
        Command::Upscale(args) => {
            inputs.insert("image".to_string(), read_image(&args.target.image)?);
            inputs.insert("seed".to_string(), args.target.seed.into());
            (args.flavor.node_id(), args.target.out)
        }
    };
    Ok((node, inputs, out))
}

fn insert_edit(inputs: &mut NodeInputs, args: &EditArgs) -> Result<()> {
    inputs.insert("image".to_string(), read_image(&args.image)?);
    inputs.insert("prompt".to_string(), args.prompt.clone().into());
    Ok(())
}

fn insert_style(inputs: &mut NodeInputs, style: StyleArgs) {
    inputs.insert("style".to_string(), style.style.into());
    inputs.insert("substyle".to_string(), style.substyle.into());
    inputs.insert("seed".to_string(), style.seed.into());
}

fn read_image(path: &Path) -> Result<NodeValue> {
    let bytes = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
    let image = decode_image(&bytes).with_context(|| format!("failed decoding {}", path.display()))?;
    Ok(image.into())
}

/// Masks are read as images; the first channel is the mask.
fn read_mask(path: &Path) -> Result<NodeValue> {
    let NodeValue::Image(image) = read_image(path)? else {
        anyhow::bail!("{} did not decode to an image", path.display());
    };
    Ok(mask_from_image(&image)?.into())
}

fn print_nodes(json: bool) -> Result<()> {
    if json {
        let schema = NODE_SPECS
            .iter()
            .map(|spec| (spec.id.to_string(), spec.to_json()))
            .collect::<serde_json::Map<String, Value>>();
        println!("{}", serde_json::to_string_pretty(&Value::Object(schema))?);
        return Ok(());
    }
    for line in node_table() {
        println!("{line}");
    }
    Ok(())
}

fn node_table() -> Vec<String> {
    let width = NODE_SPECS
        .iter()
        .map(|spec| spec.id.len())
        .max()
        .unwrap_or(0);
    NODE_SPECS
        .iter()
        .map(|spec| format!("{:<width$}  {}", spec.id, spec.display_name))
        .collect()
}
