use anyhow::{bail, Context, Result};
use chrono::{Local, Utc};
use clap::{ArgAction, Args, Parser, Subcommand};
use rand::Rng;
use serde_json::{json, Value};
use std::env;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use visiontrack::ai::{self, ChatReply, ChatRequest, ChatTurn, ImageSource};
use visiontrack::goal::{GoalId, GoalRecord, SnapshotTier, VisionBoard};
use visiontrack::progress;
use visiontrack::render::{self, FillTarget, ProgressRenderer};
use visiontrack::{save_editor, Config, Datastore, EditorAction, Goal, JsonStore, RegionEditor, Session};

#[derive(Parser, Debug)]
#[command(
    name = "visiontrack",
    version,
    about = "Vision board goals, milestones and color-fill progress renders"
)]
struct Cli {
    /// Data directory holding store.json and renders (default: $VISIONTRACK_DATA_DIR or .visiontrack)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// Session user id (default: $VISIONTRACK_USER)
    #[arg(long, global = true)]
    user: Option<String>,
    /// Debug logging on stderr
    #[arg(long, short = 'v', global = true, action = ArgAction::SetTrue)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print supported commands in JSON
    Commands,
    /// Register a vision board image or analyze one
    Board(BoardArgs),
    /// List active goals of the current board with progress
    Goals(GoalsArgs),
    /// Replay an editor script against the current board and save the result
    Edit(EditArgs),
    /// Add, toggle or list milestones
    Milestone(MilestoneArgs),
    /// Talk to the milestone coach about a goal
    Chat(ChatArgs),
    /// Record today's check-in
    Checkin(CheckinArgs),
    /// Print the current check-in streak
    Streak,
    /// List captured progress snapshots
    Snapshots(SnapshotsArgs),
    /// Render the current board with color-filled progress
    Render(RenderArgs),
}

#[derive(Args, Debug)]
struct BoardArgs {
    #[command(subcommand)]
    command: BoardCommand,
}

#[derive(Subcommand, Debug)]
enum BoardCommand {
    /// Register a board image as the current board
    Import(ImportArgs),
    /// Ask the model for categorized goals (nothing is stored)
    Analyze(AnalyzeArgs),
}

#[derive(Args, Debug)]
struct ImportArgs {
    /// Board image (png/jpg/gif)
    image: PathBuf,
    /// Extract goals and their regions with the model and store them
    #[arg(long, action = ArgAction::SetTrue)]
    extract: bool,
    /// Print the board and goals as JSON
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Board image path or http(s) URL
    image: String,
}

#[derive(Args, Debug)]
struct GoalsArgs {
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

#[derive(Args, Debug)]
struct EditArgs {
    /// JSON array of editor actions (or - for stdin)
    #[arg(long)]
    script: String,
}

#[derive(Args, Debug)]
struct MilestoneArgs {
    #[command(subcommand)]
    command: MilestoneCommand,
}

#[derive(Subcommand, Debug)]
enum MilestoneCommand {
    /// Append a milestone to a goal
    Add { goal: String, title: String },
    /// Flip a milestone's completion and capture a snapshot if a tier is reached
    Toggle { milestone: String },
    /// List a goal's milestones in order
    List { goal: String },
}

#[derive(Args, Debug)]
struct ChatArgs {
    /// Goal id
    goal: String,
    /// User message (omit for the opening greeting)
    #[arg(long)]
    message: Option<String>,
    /// JSON file with prior turns: [{"role": "user"|"assistant", "content": "..."}]
    #[arg(long)]
    history: Option<PathBuf>,
    /// Add suggested milestone N (1-based) from the reply
    #[arg(long)]
    accept: Option<usize>,
}

#[derive(Args, Debug)]
struct CheckinArgs {
    #[arg(long)]
    mood: String,
    #[arg(long)]
    reflection: Option<String>,
}

#[derive(Args, Debug)]
struct SnapshotsArgs {
    /// Only this tier (25, 50, 75 or 100)
    #[arg(long)]
    tier: Option<u8>,
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// Output PNG path (default: <data-dir>/renders/board-<timestamp>.png)
    out: Option<PathBuf>,
    /// Emit N animation frames as <out>-000.png ...
    #[arg(long)]
    frames: Option<usize>,
    /// Starting progress for the animation
    #[arg(long, default_value_t = 0.0)]
    from: f64,
    /// Render a single snapshot's goal at its tier
    #[arg(long)]
    snapshot: Option<String>,
    /// Skip outlines, badges and titles
    #[arg(long, action = ArgAction::SetTrue)]
    no_labels: bool,
    /// Disable the metadata sidecar (<out>.json)
    #[arg(long, action = ArgAction::SetTrue)]
    no_sidecar: bool,
}

struct App {
    config: Config,
    store: JsonStore,
    session: Session,
}

impl App {
    fn open(config: Config) -> Result<Self> {
        let session = config.session().context("no user: pass --user or set VISIONTRACK_USER")?;
        let store = JsonStore::open(config.store_path())?;
        Ok(Self {
            config,
            store,
            session,
        })
    }

    fn current_board(&self) -> Result<VisionBoard> {
        match self.store.current_board(&self.session)? {
            Some(board) => Ok(board),
            None => bail!("no vision board yet; run `visiontrack board import <image>` first"),
        }
    }

    fn active_goals(&self, board: &VisionBoard) -> Result<Vec<GoalRecord>> {
        Ok(self.store.active_goals(&self.session, &board.id)?)
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if let Err(err) = run(cli) {
        if let Some(domain) = err.downcast_ref::<visiontrack::Error>() {
            eprintln!("{}", domain.user_message());
        }
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("visiontrack=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("visiontrack=info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::from_env().with_overrides(cli.data_dir, cli.user);

    match cli.command {
        Commands::Commands => print_commands(),
        Commands::Board(args) => match args.command {
            BoardCommand::Import(args) => command_board_import(App::open(config)?, args),
            BoardCommand::Analyze(args) => command_board_analyze(&config, args),
        },
        Commands::Goals(args) => command_goals(App::open(config)?, args),
        Commands::Edit(args) => command_edit(App::open(config)?, args),
        Commands::Milestone(args) => command_milestone(App::open(config)?, args),
        Commands::Chat(args) => command_chat(App::open(config)?, args),
        Commands::Checkin(args) => command_checkin(App::open(config)?, args),
        Commands::Streak => command_streak(App::open(config)?),
        Commands::Snapshots(args) => command_snapshots(App::open(config)?, args),
        Commands::Render(args) => command_render(App::open(config)?, args),
    }
}

fn print_commands() -> Result<()> {
    let rows = vec![
        json!({"name": "board import", "description": "Register a board image; --extract stores model-detected goal regions."}),
        json!({"name": "board analyze", "description": "Ask the model for categorized goals on a board (JSON only)."}),
        json!({"name": "goals", "description": "List active goals of the current board with progress."}),
        json!({"name": "edit", "description": "Replay editor actions (draw/move/resize/delete) and save the regions."}),
        json!({"name": "milestone", "description": "Add, toggle or list milestones; toggles capture progress snapshots."}),
        json!({"name": "chat", "description": "Milestone coach conversation; --accept adds a suggestion."}),
        json!({"name": "checkin", "description": "Record one daily check-in with a mood."}),
        json!({"name": "streak", "description": "Consecutive check-in days ending today or yesterday."}),
        json!({"name": "snapshots", "description": "Captured 25/50/75/100% progress snapshots with badges."}),
        json!({"name": "render", "description": "Composite the board with color-filled progress (PNG, optional frames)."}),
    ];
    print_json(&json!({"commands": rows}))
}

fn command_board_import(mut app: App, args: ImportArgs) -> Result<()> {
    let image_path = abs_path(&args.image);
    if !image_path.is_file() {
        bail!("board image not found: {}", image_path.display());
    }
    if !ai::is_supported_image(&image_path) {
        bail!("unsupported board image (expected png/jpg/gif): {}", image_path.display());
    }

    let extracted = if args.extract {
        let client = app
            .config
            .model_client()
            .context("no model CLI found; set VISIONTRACK_MODEL_BIN or install codex")?;
        ai::extract_region_goals(&client, ImageSource::Path(image_path.clone()))?
    } else {
        Vec::new()
    };

    let board = app
        .store
        .create_board(&app.session, &image_path.to_string_lossy())?;
    let rows: Vec<_> = extracted
        .into_iter()
        .map(|goal| goal.into_new_goal(&board.id))
        .collect();
    let goals = if rows.is_empty() {
        Vec::new()
    } else {
        app.store.insert_goals(&app.session, &rows)?
    };
    info!(board = %board.id, goals = goals.len(), "vision board imported");

    if args.json {
        return print_json(&json!({"board": board, "goals": goals}));
    }
    println!("board {} ({})", board.id, board.image_path);
    for goal in &goals {
        println!("  {}  {}", goal.id, goal.title);
    }
    Ok(())
}

fn command_board_analyze(config: &Config, args: AnalyzeArgs) -> Result<()> {
    let image = ImageSource::parse(&args.image);
    if let ImageSource::Path(path) = &image {
        if !path.is_file() {
            bail!("board image not found: {}", path.display());
        }
    }
    let client = config
        .model_client()
        .context("no model CLI found; set VISIONTRACK_MODEL_BIN or install codex")?;
    let goals = ai::analyze_board(&client, image)?;
    print_json(&json!({"goals": goals}))
}

fn command_goals(app: App, args: GoalsArgs) -> Result<()> {
    let board = app.current_board()?;
    let mut rows = Vec::new();
    for goal in app.active_goals(&board)? {
        let milestones = app.store.milestones(&app.session, &goal.id)?;
        rows.push(json!({
            "id": goal.id,
            "title": goal.title,
            "description": goal.description,
            "category": goal.category,
            "region": goal.region,
            "milestones": milestones.len(),
            "progress": progress::progress_of(&milestones),
        }));
    }

    if args.json {
        return print_json(&json!({"board": board, "goals": rows}));
    }
    println!("board {} ({})", board.id, board.image_path);
    if rows.is_empty() {
        println!("  no goals yet");
    }
    for row in &rows {
        println!(
            "  {:<14} {:>3}%  {}",
            row["id"].as_str().unwrap_or_default(),
            row["progress"].as_u64().unwrap_or(0),
            row["title"].as_str().unwrap_or_default()
        );
    }
    Ok(())
}

fn command_edit(mut app: App, args: EditArgs) -> Result<()> {
    let raw = read_text_arg(&args.script)?;
    let actions: Vec<EditorAction> =
        serde_json::from_str(&raw).context("editor script must be a JSON array of actions")?;
    let board = app.current_board()?;
    let goals: Vec<Goal> = app.active_goals(&board)?.iter().map(Goal::from).collect();

    let mut editor = RegionEditor::new(goals);
    for (step, action) in actions.iter().enumerate() {
        editor
            .apply(action)
            .with_context(|| format!("editor action #{step} failed: {action:?}"))?;
    }
    if editor.draft().is_some() {
        warn!("script ended with an unfinished region; it is not saved");
    }

    let report = save_editor(&mut editor, &mut app.store, &app.session, &board.id)?;
    print_json(&json!({
        "board": board.id,
        "report": report,
        "goals": editor.goals().iter().map(|g| json!({
            "id": g.key().to_string(),
            "title": g.title(),
            "region": g.region(),
        })).collect::<Vec<_>>(),
    }))
}

fn command_milestone(mut app: App, args: MilestoneArgs) -> Result<()> {
    match args.command {
        MilestoneCommand::Add { goal, title } => {
            let goal = GoalId(goal);
            let milestone = progress::add_milestone(&mut app.store, &app.session, &goal, &title)?;
            print_json(&json!({"milestone": milestone}))
        }
        MilestoneCommand::Toggle { milestone } => {
            let outcome =
                progress::toggle_milestone(&mut app.store, &app.session, &milestone, Utc::now())?;
            print_json(&json!(outcome))
        }
        MilestoneCommand::List { goal } => {
            let goal = app.store.goal(&app.session, &GoalId(goal))?;
            let milestones = app.store.milestones(&app.session, &goal.id)?;
            print_json(&json!({
                "goal": goal.id,
                "title": goal.title,
                "progress": progress::progress_of(&milestones),
                "milestones": milestones,
            }))
        }
    }
}

fn command_chat(mut app: App, args: ChatArgs) -> Result<()> {
    let goal = app.store.goal(&app.session, &GoalId(args.goal))?;
    let milestones = app.store.milestones(&app.session, &goal.id)?;
    let history: Vec<ChatTurn> = match &args.history {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read chat history: {}", path.display()))?;
            serde_json::from_str(&raw).context("chat history must be a JSON array of turns")?
        }
        None => Vec::new(),
    };

    let request = ChatRequest {
        goal_title: goal.title.clone(),
        goal_description: goal.description.clone(),
        existing_milestones: milestones.iter().map(|m| m.title.clone()).collect(),
        user_message: args.message,
        history,
    };
    let reply = match app.config.model_client() {
        Some(client) => ai::milestone_chat(&client, &request),
        None => {
            warn!("no model CLI available; using fallback chat reply");
            ChatReply::fallback()
        }
    };

    let accepted = match args.accept {
        Some(n) => {
            let Some(title) = n.checked_sub(1).and_then(|i| reply.suggested_milestones.get(i))
            else {
                bail!(
                    "reply has {} suggested milestones; cannot accept #{n}",
                    reply.suggested_milestones.len()
                );
            };
            Some(progress::add_milestone(
                &mut app.store,
                &app.session,
                &goal.id,
                title,
            )?)
        }
        None => None,
    };

    print_json(&json!({"goal": goal.id, "reply": reply, "accepted": accepted}))
}

fn command_checkin(mut app: App, args: CheckinArgs) -> Result<()> {
    let today = Local::now().date_naive();
    let checkin = progress::check_in(
        &mut app.store,
        &app.session,
        today,
        &args.mood,
        args.reflection.as_deref(),
    )?;
    let streak = progress::current_streak(&app.store, &app.session, today)?;
    print_json(&json!({"check_in": checkin, "streak": streak}))
}

fn command_streak(app: App) -> Result<()> {
    let today = Local::now().date_naive();
    let streak = progress::current_streak(&app.store, &app.session, today)?;
    print_json(&json!({"today": today, "streak": streak}))
}

fn command_snapshots(app: App, args: SnapshotsArgs) -> Result<()> {
    let tier = args
        .tier
        .map(SnapshotTier::try_from)
        .transpose()
        .map_err(anyhow::Error::msg)?;
    let mut rows = Vec::new();
    for snapshot in app.store.snapshots(&app.session)? {
        if tier.is_some_and(|t| t != snapshot.milestone_percentage) {
            continue;
        }
        let title = app
            .store
            .goal(&app.session, &snapshot.goal_id)
            .map(|g| g.title)
            .unwrap_or_default();
        rows.push(json!({
            "snapshot": snapshot,
            "goal_title": title,
            "badge": snapshot.milestone_percentage.badge(),
        }));
    }
    print_json(&json!({"snapshots": rows}))
}

fn command_render(app: App, args: RenderArgs) -> Result<()> {
    let board = app.current_board()?;
    let targets = match &args.snapshot {
        Some(id) => snapshot_target(&app, id)?,
        None => {
            let mut targets = Vec::new();
            for goal in app.active_goals(&board)? {
                let milestones = app.store.milestones(&app.session, &goal.id)?;
                targets.push(FillTarget {
                    title: goal.title,
                    region: goal.region,
                    progress: f64::from(progress::progress_of(&milestones)),
                });
            }
            targets
        }
    };

    let image = image::open(&board.image_path)
        .with_context(|| format!("failed to open board image: {}", board.image_path))?;
    let renderer = ProgressRenderer {
        labels: !args.no_labels,
        ..ProgressRenderer::default()
    };
    let out = match args.out {
        Some(path) => abs_path(&path),
        None => app.config.renders_dir().join(format!(
            "board-{}-{}.png",
            timestamp_compact(),
            rand::thread_rng().gen_range(1000..9999)
        )),
    };
    ensure_parent_dir(&out)?;

    let mut written = Vec::new();
    match args.frames.filter(|n| *n > 1) {
        Some(frames) => {
            let start = args.from.clamp(0.0, 100.0);
            for (i, frame) in renderer
                .animate(&image, &targets, start, frames)
                .iter()
                .enumerate()
            {
                let path = frame_path(&out, i);
                frame
                    .save(&path)
                    .with_context(|| format!("failed to write frame: {}", path.display()))?;
                written.push(path);
            }
        }
        None => {
            renderer
                .render(&image, &targets)
                .save(&out)
                .with_context(|| format!("failed to write render: {}", out.display()))?;
            written.push(out.clone());
        }
    }
    info!(files = written.len(), out = %out.display(), "board rendered");

    let meta = json!({
        "board": board.id,
        "image": board.image_path,
        "outputs": written,
        "duration_ms": render::FILL_DURATION.as_millis() as u64,
        "layers": render::layers(&targets),
        "rendered_at": Utc::now().to_rfc3339(),
    });
    if !args.no_sidecar {
        write_json_pretty(&out.with_extension("json"), &meta)?;
    }
    print_json(&meta)
}

fn snapshot_target(app: &App, id: &str) -> Result<Vec<FillTarget>> {
    let Some(snapshot) = app
        .store
        .snapshots(&app.session)?
        .into_iter()
        .find(|s| s.id == id)
    else {
        bail!("snapshot not found: {id}");
    };
    let goal = app.store.goal(&app.session, &snapshot.goal_id)?;
    Ok(vec![FillTarget {
        title: goal.title,
        region: goal.region,
        progress: f64::from(snapshot.milestone_percentage.percentage()),
    }])
}

fn frame_path(out: &Path, index: usize) -> PathBuf {
    let stem = out
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("frame")
        .to_string();
    let parent = out.parent().unwrap_or_else(|| Path::new(""));
    parent.join(format!("{stem}-{index:03}.png"))
}

fn read_text_arg(arg: &str) -> Result<String> {
    if arg == "-" {
        let mut raw = String::new();
        io::stdin()
            .read_to_string(&mut raw)
            .context("failed to read stdin")?;
        return Ok(raw);
    }
    fs::read_to_string(arg).with_context(|| format!("failed to read {arg}"))
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn write_json_pretty(path: &Path, value: &Value) -> Result<()> {
    ensure_parent_dir(path)?;
    let raw = serde_json::to_string_pretty(value)?;
    fs::write(path, raw).with_context(|| format!("failed to write JSON: {}", path.display()))?;
    Ok(())
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create parent directory: {}", parent.display())
            })?;
        }
    }
    Ok(())
}

fn abs_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(path)
}

fn timestamp_compact() -> String {
    Utc::now().format("%Y%m%d-%H%M%S").to_string()
}
