use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use api_client::{ApiClient, ApiConfig};
use gallery::{Gallery, MediaKind};
use jobs::{JobEventKind, JobRunner, JsonFileStore, PollConfig};
use timeline::{ExportRequest, MediaAsset, Timeline, TrackKind};
use training::UploadSet;

#[derive(Parser)]
#[command(name = "studio-cli")]
#[command(about = "AI Studio CLI - character training and media generation")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Backend base URL, overriding the stored configuration
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the backend sign-in page and store the resulting session cookie
    Login {
        /// Where the OAuth flow should land after sign-in
        #[arg(long, default_value = "http://localhost:3000/")]
        redirect_uri: String,

        /// Session cookie to store directly, skipping the browser
        #[arg(long)]
        cookie: Option<String>,
    },

    /// Invalidate the backend session and forget the stored cookie
    Logout,

    /// Show the signed-in user
    Whoami,

    /// List usable character models, personal and shared
    Models,

    /// Submit a character training request
    Train {
        /// Character name
        name: String,

        /// Image and video files, or directories of them
        files: Vec<PathBuf>,
    },

    /// Video generation jobs
    #[command(subcommand)]
    Video(VideoCommands),

    /// Browse generated media
    Gallery {
        /// Show only one kind of media (image, video)
        #[arg(long)]
        kind: Option<String>,
    },

    /// Build a small demo timeline and print its export request
    Edit {
        /// Write the export JSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum VideoCommands {
    /// Start a generation job and watch it to completion
    Generate {
        /// Prompt text
        prompt: String,

        /// Model id to generate with
        #[arg(short, long)]
        model: i64,

        /// Print the prompt id and exit instead of watching the job
        #[arg(long)]
        no_wait: bool,
    },

    /// List past generation jobs
    List,

    /// Resume watching jobs left pending by an earlier run
    Recover,
}

fn config_path() -> PathBuf {
    jobs::app_data_dir().join("client.json")
}

fn load_config(api_url: Option<&str>) -> ApiConfig {
    let mut config = ApiConfig::load(&config_path()).unwrap_or_default();
    if let Some(url) = api_url {
        config.base_url = url.to_string();
    }
    config
}

fn client(config: &ApiConfig) -> Result<ApiClient> {
    ApiClient::new(config.clone()).context("build API client")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let config = load_config(cli.api_url.as_deref());

    match cli.command {
        Commands::Login {
            redirect_uri,
            cookie,
        } => login_command(config, &redirect_uri, cookie).await,
        Commands::Logout => logout_command(config).await,
        Commands::Whoami => whoami_command(config).await,
        Commands::Models => models_command(config).await,
        Commands::Train { name, files } => train_command(config, &name, files).await,
        Commands::Video(cmd) => match cmd {
            VideoCommands::Generate {
                prompt,
                model,
                no_wait,
            } => generate_command(config, &prompt, model, no_wait).await,
            VideoCommands::List => video_list_command(config).await,
            VideoCommands::Recover => recover_command(config).await,
        },
        Commands::Gallery { kind } => gallery_command(config, kind.as_deref()).await,
        Commands::Edit { output } => edit_command(output),
    }
}

async fn login_command(
    mut config: ApiConfig,
    redirect_uri: &str,
    cookie: Option<String>,
) -> Result<()> {
    if let Some(cookie) = cookie {
        config.session_cookie = Some(cookie);
        config.save(&config_path())?;
        let client = client(&config)?;
        match client.current_user().await {
            Some(user) => info!("signed in as {} <{}>", user.name, user.email),
            None => warn!("cookie stored, but the backend did not accept it"),
        }
        return Ok(());
    }

    let client = client(&config)?;
    let url = client.sign_in_url(redirect_uri);
    info!("opening sign-in page: {url}");
    if webbrowser::open(&url).is_err() {
        println!("Open this URL in a browser to sign in:\n  {url}");
    }
    println!("After signing in, run `studio-cli login --cookie <SESSION-COOKIE>`.");
    Ok(())
}

async fn logout_command(mut config: ApiConfig) -> Result<()> {
    if config.session_cookie.is_some() {
        let client = client(&config)?;
        if let Err(e) = client.sign_out().await {
            warn!("backend logout failed: {e}");
        }
    }
    config.session_cookie = None;
    config.save(&config_path())?;
    info!("signed out");
    Ok(())
}

async fn whoami_command(config: ApiConfig) -> Result<()> {
    let client = client(&config)?;
    match client.current_user().await {
        Some(user) => println!("{} <{}> (id {})", user.name, user.email, user.id),
        None => println!("not signed in"),
    }
    Ok(())
}

async fn models_command(config: ApiConfig) -> Result<()> {
    let client = client(&config)?;
    let models = client.list_models().await?;
    if models.is_empty() {
        println!("no completed models");
        return Ok(());
    }
    for model in models {
        println!("{:>6}  {}", model.id, model.name);
    }
    Ok(())
}

async fn train_command(config: ApiConfig, name: &str, files: Vec<PathBuf>) -> Result<()> {
    let mut set = UploadSet::new();
    for path in files {
        if path.is_dir() {
            let dir_set = UploadSet::from_directory(&path)?;
            set.add_files(dir_set.files().iter().map(|f| f.path.clone()));
        } else {
            set.add(path);
        }
    }
    for rejected in set.rejected() {
        warn!("skipping {}: {}", rejected.path.display(), rejected.reason);
    }
    set.check_ready(name)?;

    let preview_dir = jobs::app_data_dir().join("previews");
    match set.generate_previews(&preview_dir, 256) {
        Ok(n) if n > 0 => info!("wrote {n} preview thumbnail(s) to {}", preview_dir.display()),
        Ok(_) => {}
        Err(e) => warn!("preview generation failed: {e}"),
    }

    let stats = set.stats();
    info!(
        "training {:?} with {} images and {} videos",
        name, stats.images, stats.videos
    );
    let client = client(&config)?;
    client.start_training(name, &set.paths()).await?;
    println!("training request for {name:?} accepted");
    Ok(())
}

async fn generate_command(
    config: ApiConfig,
    prompt: &str,
    model_id: i64,
    no_wait: bool,
) -> Result<()> {
    let client = Arc::new(client(&config)?);
    let models = client.list_models().await?;
    let model = models.iter().find(|m| m.id == model_id);
    if model.is_none() {
        bail!("model {model_id} is not in your completed models; run `studio-cli models`");
    }

    let store = Arc::new(JsonFileStore::default_location());
    let runner = JobRunner::new(client, store, PollConfig::default());
    let events = runner.events();

    let job = runner.submit(prompt, model).await?;
    println!("job {} submitted", job.prompt_id);
    if no_wait {
        runner.cancel(&job.prompt_id);
        println!("run `studio-cli video recover` to pick it up again");
        return Ok(());
    }

    watch_events(&events).await
}

async fn recover_command(config: ApiConfig) -> Result<()> {
    let client = Arc::new(client(&config)?);
    let store = Arc::new(JsonFileStore::default_location());
    let runner = JobRunner::new(client, store, PollConfig::default());
    let events = runner.events();

    let report = runner.recover().await?;
    for id in &report.discarded {
        info!("job {id} resolved while we were away, dropped");
    }
    for id in &report.kept {
        warn!("job {id} could not be checked, kept for next time");
    }
    if report.resumed.is_empty() {
        println!("nothing to resume");
        return Ok(());
    }
    println!("resumed {} job(s)", report.resumed.len());

    let mut remaining = report.resumed.len();
    while remaining > 0 {
        if !drain_one(&events).await? {
            break;
        }
        remaining -= 1;
    }
    Ok(())
}

/// Print events for a single job until it reaches a verdict.
async fn watch_events(events: &crossbeam_channel::Receiver<jobs::JobEvent>) -> Result<()> {
    drain_one(events).await.map(|_| ())
}

/// Pump the event channel; returns true when a job reached a verdict.
async fn drain_one(events: &crossbeam_channel::Receiver<jobs::JobEvent>) -> Result<bool> {
    loop {
        match events.try_recv() {
            Ok(event) => {
                let id = &event.prompt_id;
                match event.kind {
                    JobEventKind::Submitted => info!("job {id} submitted"),
                    JobEventKind::InProgress => info!("job {id} still in progress"),
                    JobEventKind::Completed { video_url } => {
                        println!("job {id} done: {video_url}");
                        return Ok(true);
                    }
                    JobEventKind::Failed { reason } => {
                        warn!("job {id} failed: {reason}");
                        return Ok(true);
                    }
                    JobEventKind::NotFound => {
                        warn!("job {id} is unknown to the backend");
                        return Ok(true);
                    }
                    JobEventKind::Stalled { reason } => {
                        warn!("job {id} stalled: {reason}; run `studio-cli video recover` later");
                        return Ok(true);
                    }
                }
            }
            Err(crossbeam_channel::TryRecvError::Empty) => {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            Err(crossbeam_channel::TryRecvError::Disconnected) => return Ok(false),
        }
    }
}

async fn video_list_command(config: ApiConfig) -> Result<()> {
    let client = client(&config)?;
    let videos = client.list_videos().await?;
    if videos.is_empty() {
        println!("no generation jobs yet");
        return Ok(());
    }
    for video in videos {
        let url = video.video_url.as_deref().unwrap_or("-");
        println!("{:>10}  {:<10}  {}  {}", video.id, video.status, url, video.prompt);
    }
    Ok(())
}

async fn gallery_command(config: ApiConfig, kind: Option<&str>) -> Result<()> {
    let filter = match kind {
        None => None,
        Some("image") => Some(MediaKind::Image),
        Some("video") => Some(MediaKind::Video),
        Some(other) => bail!("unknown media kind {other:?}, expected image or video"),
    };

    let client = client(&config)?;
    let gallery = Gallery::from_videos(client.list_videos().await?);
    let items = gallery.filter(filter);
    if items.is_empty() {
        println!("gallery is empty");
        return Ok(());
    }
    for item in items {
        let url = item.url.as_deref().unwrap_or("-");
        println!(
            "{:>10}  {:<11}  {}  {}",
            item.id,
            format!("{:?}", item.status),
            url,
            item.prompt
        );
    }
    Ok(())
}

fn edit_command(output: Option<PathBuf>) -> Result<()> {
    let mut tl = Timeline::new("Demo");
    let video = tl.add_asset(
        MediaAsset::new("generated clip", "https://example/clip.mp4", TrackKind::Video)
            .with_duration(8.0),
    );
    let audio = tl.add_asset(
        MediaAsset::new("soundtrack", "https://example/track.mp3", TrackKind::Audio)
            .with_duration(30.0),
    );

    let clip = tl.add_clip(&video, 0.0)?;
    tl.add_clip(&video, 8.0)?;
    tl.add_clip(&audio, 0.0)?;
    tl.trim_clip(&clip, 1.0, 6.0)?;

    let json = ExportRequest::from_timeline(&tl).to_json()?;
    match output {
        Some(path) => {
            std::fs::write(&path, &json)?;
            info!("export request written to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}
