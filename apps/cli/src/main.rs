use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use novelist_core::{
    project_stats, subtree_stats, CancellationToken, SearchReplaceSession, StatsHistoryStore,
};
use novelist_project::{
    Command as EditCommand, EditLog, ModelPath, NodeDraft, NodeKind, Project, ProjectNodeId,
    ProjectProperties, ProjectStore,
};
use novelist_search::{snippet, SearchMode, SearchQuery, SearchScope};
use novelist_settings::{
    FindPreferences, Preferences, PreferencesStore, ScopePreference, Translator, TsCatalog,
    CONTEXT_FIND_WIDGET, CONTEXT_PROJECT_MODEL, CONTEXT_STATS_DIALOG,
};

const SNIPPET_RADIUS: usize = 24;

#[derive(Parser)]
#[command(
    name = "novelist-cli",
    about = "Command-line tools for Novelist projects",
    author,
    version
)]
struct Cli {
    /// 指定工作區根目錄；預設為目前目錄。 / Workspace root (defaults to current directory).
    #[arg(long, global = true, value_name = "PATH")]
    workspace: Option<PathBuf>,
    /// 輸出除錯記錄。 / Print debug logging to stderr.
    #[arg(long, short, global = true)]
    verbose: bool,
    /// 額外的 Qt 翻譯檔，優先於內建翻譯。 / Extra Qt `.ts` catalogs, consulted before the built-in one.
    #[arg(long = "catalog", global = true, value_name = "FILE")]
    catalogs: Vec<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 建立新的空白專案。 / Create an empty project file.
    Init(InitArgs),
    /// 新增章節或場景。 / Add a chapter or scene.
    Add(AddArgs),
    /// 重新命名節點。 / Rename a node (the project root renames the project).
    Rename(RenameArgs),
    /// 移動節點。 / Move a node to a new parent.
    Move(MoveArgs),
    /// 移除節點及其子節點。 / Remove a node and its children.
    Remove(RemoveArgs),
    /// 顯示專案大綱。 / Print the project outline with model paths.
    Outline(OutlineArgs),
    /// 搜尋專案內容。 / Search the project.
    Find(FindArgs),
    /// 搜尋並取代。 / Search and replace every match.
    Replace(ReplaceArgs),
    /// 顯示字數統計。 / Print word and letter counts and record snapshots.
    Stats(StatsArgs),
}

#[derive(Args)]
struct InitArgs {
    /// 專案檔路徑。 / Project file to create.
    file: PathBuf,
    #[arg(long)]
    name: String,
    #[arg(long, default_value = "")]
    author: String,
    #[arg(long, default_value = "en_US")]
    lang: String,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum NodeKindChoice {
    Chapter,
    Scene,
}

#[derive(Args)]
struct AddArgs {
    file: PathBuf,
    kind: NodeKindChoice,
    /// 父節點的模型路徑，例如 `0/1`。 / Model path of the parent, e.g. `0/1`.
    parent: ModelPath,
    name: String,
    /// 插入位置；預設附加於最後。 / Child index; appends when omitted.
    #[arg(long)]
    index: Option<usize>,
    /// 場景文字。 / Scene text.
    #[arg(long)]
    content: Option<String>,
}

#[derive(Args)]
struct RenameArgs {
    file: PathBuf,
    path: ModelPath,
    name: String,
}

#[derive(Args)]
struct MoveArgs {
    file: PathBuf,
    path: ModelPath,
    new_parent: ModelPath,
    /// 移動後在新父節點中的位置。 / Position among the new parent's children after the move.
    index: usize,
}

#[derive(Args)]
struct RemoveArgs {
    file: PathBuf,
    path: ModelPath,
}

#[derive(Args)]
struct OutlineArgs {
    file: PathBuf,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ScopeChoice {
    Scene,
    Chapter,
    Project,
}

impl From<ScopeChoice> for SearchScope {
    fn from(choice: ScopeChoice) -> Self {
        match choice {
            ScopeChoice::Scene => SearchScope::Scene,
            ScopeChoice::Chapter => SearchScope::Chapter,
            ScopeChoice::Project => SearchScope::Project,
        }
    }
}

/// Toggles of the find panel. Each `--x`/`--no-x` pair overrides the
/// preference; the last one given wins, and neither keeps the preference.
#[derive(Args)]
struct FindOptions {
    /// 使用正規表示式。 / Interpret the pattern as a regular expression.
    #[arg(long, overrides_with = "no_regex")]
    regex: bool,
    /// 以純文字搜尋。 / Search for the literal pattern.
    #[arg(long, overrides_with = "regex")]
    no_regex: bool,
    /// 區分大小寫。 / Match case.
    #[arg(long, overrides_with = "no_match_case")]
    match_case: bool,
    /// 不區分大小寫。 / Ignore case.
    #[arg(long, overrides_with = "match_case")]
    no_match_case: bool,
    /// 同時搜尋標題。 / Search titles as well as scene text.
    #[arg(long, overrides_with = "no_titles")]
    titles: bool,
    /// 只搜尋場景文字。 / Search scene text only.
    #[arg(long, overrides_with = "titles")]
    no_titles: bool,
    #[arg(long, value_enum)]
    scope: Option<ScopeChoice>,
    /// 目前開啟的場景。 / Model path of the open scene, used by the scene and chapter scopes.
    #[arg(long, value_name = "PATH")]
    scene: Option<ModelPath>,
}

#[derive(Args)]
struct FindArgs {
    file: PathBuf,
    pattern: String,
    #[command(flatten)]
    options: FindOptions,
}

#[derive(Args)]
struct ReplaceArgs {
    file: PathBuf,
    pattern: String,
    replacement: String,
    #[command(flatten)]
    options: FindOptions,
    /// 略過指定編號的結果。 / Skip the occurrence with this number (repeatable).
    #[arg(long = "exclude", value_name = "N")]
    exclude: Vec<usize>,
    /// 將結果寫回專案檔。 / Write the result back to the project file.
    #[arg(long)]
    apply: bool,
}

#[derive(Args)]
struct StatsArgs {
    file: PathBuf,
    /// 只統計此節點之下。 / Count only the subtree at this model path.
    #[arg(long, value_name = "PATH")]
    path: Option<ModelPath>,
    /// 間隔已過時記錄專案快照。 / Record a project snapshot when the interval has elapsed.
    #[arg(long)]
    snapshot: bool,
    /// 列出已記錄的快照。 / List recorded snapshots.
    #[arg(long)]
    history: bool,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let Cli {
        workspace,
        verbose,
        catalogs,
        command,
    } = Cli::parse();
    init_logging(verbose);
    let bench = Workbench::open(workspace, &catalogs)?;
    match command {
        Commands::Init(args) => execute_init(&bench, args),
        Commands::Add(args) => execute_add(&bench, args),
        Commands::Rename(args) => execute_rename(&bench, args),
        Commands::Move(args) => execute_move(&bench, args),
        Commands::Remove(args) => execute_remove(&bench, args),
        Commands::Outline(args) => execute_outline(&bench, args),
        Commands::Find(args) => execute_find(&bench, args),
        Commands::Replace(args) => execute_replace(&bench, args),
        Commands::Stats(args) => execute_stats(&bench, args),
    }
}

fn init_logging(verbose: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if verbose {
        builder.filter_level(LevelFilter::Debug);
    }
    // A logger installed by an embedding process wins.
    let _ = builder.try_init();
}

/// Workspace root plus the settings every command needs.
struct Workbench {
    root: PathBuf,
    preferences: Preferences,
    translator: Translator,
}

impl Workbench {
    fn open(workspace: Option<PathBuf>, catalogs: &[PathBuf]) -> Result<Self> {
        let root = resolve_workspace(workspace)?;
        let store = PreferencesStore::load(preferences_path(&root))
            .context("failed to load preferences")?;
        let preferences = store.preferences().clone();

        let mut translator = Translator::identity();
        for path in catalogs {
            let path = resolve_input_path(&root, path);
            let catalog = TsCatalog::load(&path)
                .with_context(|| format!("failed to load catalog {}", path.display()))?;
            translator = translator.with_catalog(catalog);
        }
        if let Some(builtin) = TsCatalog::builtin(&preferences.ui.locale) {
            translator = translator.with_catalog(builtin);
        }
        log::debug!(
            "workspace {} (locale {})",
            root.display(),
            preferences.ui.locale
        );
        Ok(Self {
            root,
            preferences,
            translator,
        })
    }

    fn store(&self, file: &Path) -> ProjectStore {
        ProjectStore::new(resolve_input_path(&self.root, file))
    }

    fn load_project(&self, file: &Path) -> Result<(ProjectStore, Project)> {
        let store = self.store(file);
        let project = store
            .load()
            .with_context(|| format!("failed to read project {}", store.path().display()))?
            .ok_or_else(|| {
                anyhow!(
                    "project file {} does not exist; create it with `novelist-cli init`",
                    store.path().display()
                )
            })?;
        Ok((store, project))
    }

    fn edit_log(&self) -> EditLog {
        EditLog::new()
            .with_limit(self.preferences.history.undo_limit)
            .with_translator(self.translator.clone())
    }

    fn session(&self) -> SearchReplaceSession {
        SearchReplaceSession::new().with_translator(self.translator.clone())
    }
}

fn execute_init(bench: &Workbench, args: InitArgs) -> Result<()> {
    let store = bench.store(&args.file);
    if store.path().exists() {
        bail!("{} already exists", store.path().display());
    }
    let project = Project::new(ProjectProperties::new(args.name, args.author, args.lang));
    store
        .save(&project)
        .with_context(|| format!("failed to write {}", store.path().display()))?;
    println!(
        "Created project \"{}\" at {}",
        project.properties().name,
        store.path().display()
    );
    Ok(())
}

fn execute_add(bench: &Workbench, args: AddArgs) -> Result<()> {
    let (store, mut project) = bench.load_project(&args.file)?;
    let parent = resolve_node(&project, &args.parent)?;
    let index = match args.index {
        Some(index) => index,
        None => project.node(parent).map_or(0, |node| node.children().len()),
    };
    let draft = match (args.kind, args.content) {
        (NodeKindChoice::Chapter, Some(_)) => bail!("chapters do not have content"),
        (NodeKindChoice::Chapter, None) => NodeDraft::chapter(args.name),
        (NodeKindChoice::Scene, content) => {
            NodeDraft::scene(args.name).with_content(content.unwrap_or_default())
        }
    };
    let command = EditCommand::insert(&mut project, parent, index, draft)?;
    let id = command.target();
    apply_and_save(bench, &store, &mut project, command)?;
    if let Some(path) = project.path_of(id) {
        println!("Added at {path}");
    }
    Ok(())
}

fn execute_rename(bench: &Workbench, args: RenameArgs) -> Result<()> {
    let (store, mut project) = bench.load_project(&args.file)?;
    let node = resolve_node(&project, &args.path)?;
    let command = if node == project.project_root() {
        let mut properties = project.properties().clone();
        properties.name = args.name;
        EditCommand::change_properties(&project, properties)
    } else {
        EditCommand::rename(&project, node, args.name)?
    };
    apply_and_save(bench, &store, &mut project, command)
}

fn execute_move(bench: &Workbench, args: MoveArgs) -> Result<()> {
    let (store, mut project) = bench.load_project(&args.file)?;
    let node = resolve_node(&project, &args.path)?;
    let new_parent = resolve_node(&project, &args.new_parent)?;
    let command = EditCommand::move_node(&project, node, new_parent, args.index)?;
    apply_and_save(bench, &store, &mut project, command)
}

fn execute_remove(bench: &Workbench, args: RemoveArgs) -> Result<()> {
    let (store, mut project) = bench.load_project(&args.file)?;
    let node = resolve_node(&project, &args.path)?;
    let command = EditCommand::remove(&project, node)?;
    apply_and_save(bench, &store, &mut project, command)
}

fn apply_and_save(
    bench: &Workbench,
    store: &ProjectStore,
    project: &mut Project,
    command: EditCommand,
) -> Result<()> {
    let mut log = bench.edit_log();
    let label = log.push(project, command)?;
    store
        .save(project)
        .with_context(|| format!("failed to write {}", store.path().display()))?;
    println!("{label}");
    Ok(())
}

fn execute_outline(bench: &Workbench, args: OutlineArgs) -> Result<()> {
    let (_, project) = bench.load_project(&args.file)?;
    let tr = |source: &'static str| bench.translator.tr(CONTEXT_PROJECT_MODEL, source);
    for root in project.roots() {
        for id in project.subtree(root) {
            let (Some(node), Some(path)) = (project.node(id), project.path_of(id)) else {
                continue;
            };
            let name = match node.kind() {
                NodeKind::NotebookRoot => tr("Notebook"),
                _ if node.name().is_empty() => tr("<unnamed>"),
                _ => node.name(),
            };
            let kind = match node.kind() {
                NodeKind::ProjectRoot => "project",
                NodeKind::NotebookRoot => "notebook",
                NodeKind::Chapter => "chapter",
                NodeKind::Scene => "scene",
            };
            let indent = "  ".repeat(path.depth().saturating_sub(1));
            println!("{:<12}{indent}{name} ({kind})", path.to_string());
        }
    }
    Ok(())
}

fn execute_find(bench: &Workbench, args: FindArgs) -> Result<()> {
    let (_, project) = bench.load_project(&args.file)?;
    let mut session = run_search(bench, &project, args.pattern, &args.options)?;
    if session.occurrences().is_empty() {
        println!("No matches found.");
    } else {
        for (index, occurrence) in session.occurrences().iter().enumerate() {
            let path = project
                .path_of(occurrence.node)
                .map_or_else(|| "?".to_string(), |path| path.to_string());
            let field_name = occurrence.field.to_string();
            let field = bench.translator.tr(CONTEXT_FIND_WIDGET, &field_name);
            let text = project.field(occurrence.node, occurrence.field)?;
            let context = snippet(text, occurrence.range.clone(), SNIPPET_RADIUS)
                .map_or_else(|| occurrence.matched.clone(), |snip| snip.to_string());
            println!("#{index} {path} {field}: {context}");
        }
        session.next()?;
    }
    println!("{}", session.match_status());
    Ok(())
}

fn execute_replace(bench: &Workbench, args: ReplaceArgs) -> Result<()> {
    let (store, mut project) = bench.load_project(&args.file)?;
    let mut session = run_search(bench, &project, args.pattern, &args.options)?;
    for index in &args.exclude {
        session.exclude(*index)?;
    }
    if session.navigable_count() == 0 {
        println!("No matches found.");
        return Ok(());
    }

    let mut log = bench.edit_log();
    let report = session.replace_all(&args.replacement, &mut project, &mut log)?;
    println!("Replaced {} occurrences", report.replaced);
    if let Some(message) = report.failure_message(&bench.translator) {
        println!("{message}");
    }
    if args.apply {
        store
            .save(&project)
            .with_context(|| format!("failed to write {}", store.path().display()))?;
        println!("Saved {}", store.path().display());
    } else {
        println!("Dry run only; re-run with --apply to write changes.");
    }
    Ok(())
}

fn execute_stats(bench: &Workbench, args: StatsArgs) -> Result<()> {
    let (store, project) = bench.load_project(&args.file)?;
    let stats = match &args.path {
        Some(path) => subtree_stats(&project, resolve_node(&project, path)?),
        None => project_stats(&project),
    };
    let tr = |source: &'static str| bench.translator.tr(CONTEXT_STATS_DIALOG, source);
    println!("{}: {}", tr("Words"), stats.words);
    println!("{}: {}", tr("Letters"), stats.chars);

    if !args.snapshot && !args.history {
        return Ok(());
    }
    let history_store = StatsHistoryStore::new(stats_history_path(&bench.root, store.path()));
    let mut history = history_store
        .load()
        .with_context(|| format!("failed to read {}", history_store.path().display()))?;
    if args.snapshot {
        let interval = bench.preferences.stats.snapshot_interval_secs();
        match history.record_if_due(project_stats(&project), interval) {
            Some(snapshot) => {
                history_store.save(&history).with_context(|| {
                    format!("failed to write {}", history_store.path().display())
                })?;
                println!("Snapshot recorded at {}", snapshot.taken_at_unix);
            }
            None => println!(
                "Snapshot skipped; the last one is less than {} minutes old.",
                bench.preferences.stats.snapshot_interval_minutes
            ),
        }
    }
    if args.history {
        println!("{}:", tr("Snapshots"));
        for snapshot in history.snapshots() {
            println!(
                "{:>12} {:>8} {:>10}",
                snapshot.taken_at_unix, snapshot.stats.words, snapshot.stats.chars
            );
        }
    }
    Ok(())
}

fn run_search(
    bench: &Workbench,
    project: &Project,
    pattern: String,
    options: &FindOptions,
) -> Result<SearchReplaceSession> {
    let query = build_query(&bench.preferences.find, pattern, options);
    let scene = options
        .scene
        .as_ref()
        .map(|path| resolve_node(project, path))
        .transpose()?;
    let mut session = bench.session();
    session.start_search(project, query, scene, &CancellationToken::new())?;
    Ok(session)
}

fn build_query(defaults: &FindPreferences, pattern: String, options: &FindOptions) -> SearchQuery {
    let mode = if toggle(options.regex, options.no_regex, defaults.regex) {
        SearchMode::Regex
    } else {
        SearchMode::Plain
    };
    let scope = options
        .scope
        .map(SearchScope::from)
        .unwrap_or_else(|| scope_from_preference(defaults.scope));
    SearchQuery::new(pattern)
        .with_mode(mode)
        .with_case_sensitive(toggle(
            options.match_case,
            options.no_match_case,
            defaults.match_case,
        ))
        .with_scope(scope)
        .with_titles(toggle(options.titles, options.no_titles, defaults.search_titles))
}

fn toggle(on: bool, off: bool, default: bool) -> bool {
    match (on, off) {
        (true, _) => true,
        (_, true) => false,
        _ => default,
    }
}

fn scope_from_preference(scope: ScopePreference) -> SearchScope {
    match scope {
        ScopePreference::Scene => SearchScope::Scene,
        ScopePreference::Chapter => SearchScope::Chapter,
        ScopePreference::Project => SearchScope::Project,
    }
}

fn resolve_node(project: &Project, path: &ModelPath) -> Result<ProjectNodeId> {
    project
        .resolve(path)
        .ok_or_else(|| anyhow!("no node at path {path}"))
}

fn preferences_path(workspace_root: &Path) -> PathBuf {
    workspace_root.join(".novelist").join("preferences.json")
}

/// Snapshot history of `project_file`, kept beside the preferences.
fn stats_history_path(workspace_root: &Path, project_file: &Path) -> PathBuf {
    let stem = project_file
        .file_stem()
        .map_or_else(|| "project".into(), |stem| stem.to_string_lossy());
    workspace_root
        .join(".novelist")
        .join(format!("{stem}.stats.json"))
}

fn resolve_workspace(workspace: Option<PathBuf>) -> Result<PathBuf> {
    match workspace {
        Some(path) if path.is_absolute() => Ok(path),
        Some(path) => Ok(std::env::current_dir()
            .context("determine current directory")?
            .join(path)),
        None => std::env::current_dir().context("determine current directory"),
    }
}

fn resolve_input_path(workspace_root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        workspace_root.join(path)
    }
}
