use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use mindapps::adb::{self, AdbPackageManager};
use mindapps::android_packagemanager::{open_app, PackageCandidates, PackageQuery, PackageSnapshot};
use mindapps::api_catalog::CatalogClient;
use mindapps::app_operations_queue::{AppOperationsQueue, OperationBackend, OperationStatus};
use mindapps::calc_appstate::{AppState, AppViewState};
use mindapps::db_preferences::{JsonFileStore, Preferences};
use mindapps::notify::{LogNotifier, UnsupportedBadge};
use mindapps::shared_store::{SharedStore, UiState};
use mindapps::store_view::{ActionOutcome, StoreViewModel};
use mindapps::update_check_worker::{UpdateCheckWorker, UpdateScheduler};
use mindapps::{log_capture, Config, LogLevel, Settings};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const SETTINGS_POLL_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "mindapps")]
#[command(author, version, about = "App store client for Android devices over adb", long_about = None)]
struct Cli {
    /// adb device serial (overrides settings)
    #[arg(short, long, global = true)]
    device: Option<String>,

    /// Log level: error, warn, info, debug or trace (overrides settings)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Print captured log lines when the command finishes
    #[arg(long, global = true)]
    show_logs: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List catalog apps with their install state
    List {
        #[arg(short, long, value_enum, default_value_t = Tab::All)]
        tab: Tab,
    },
    /// Check for updates now and persist the result
    Check,
    /// Show the updates found by the last check
    Updates {
        /// Forget the stored results after showing them
        #[arg(long)]
        clear: bool,
    },
    /// Download and install (or update) an app
    Install { package: String },
    /// Uninstall an app
    Uninstall { package: String },
    /// Launch an installed app
    Open { package: String },
    /// Manage the library
    Library {
        #[command(subcommand)]
        action: LibraryAction,
    },
    /// Turn update notifications on or off
    Notifications { state: Toggle },
    /// Run periodic update checks until interrupted
    Watch {
        /// Hours between checks (overrides settings)
        #[arg(long)]
        interval_hours: Option<u64>,
    },
    /// Save the log level; a running `watch` picks it up
    LogLevel {
        /// error, warn, info, debug or trace
        level: String,
    },
    /// List attached adb devices
    Devices,
}

#[derive(Subcommand)]
enum LibraryAction {
    List,
    Add { package: String },
    Remove { package: String },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Tab {
    All,
    Library,
    Discover,
    Updates,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Toggle {
    On,
    Off,
}

struct Store {
    settings: Settings,
    prefs: Preferences,
    adb: Arc<AdbPackageManager>,
    api: Arc<CatalogClient>,
    shared_store: Arc<SharedStore>,
    config: Config,
}

impl Store {
    fn open(config: Config, mut settings: Settings, device: Option<String>) -> Result<Self> {
        if device.is_some() {
            settings.adb_device = device;
        }
        let file_store = JsonFileStore::open(&config.preferences_path())?;

        Ok(Self {
            prefs: Preferences::new(Arc::new(file_store)),
            adb: Arc::new(AdbPackageManager::new(settings.adb_device.clone())),
            api: Arc::new(CatalogClient::new(&settings)),
            shared_store: Arc::new(SharedStore::new()),
            settings,
            config,
        })
    }

    /// One-shot package snapshot, falling back to per-package adb queries.
    fn packages(&self) -> Arc<dyn PackageQuery> {
        match self.adb.list_packages() {
            Ok(snapshot) => {
                tracing::debug!("Package snapshot with {} entries", snapshot.len());
                Arc::new(snapshot)
            }
            Err(e) => {
                tracing::warn!("Package listing failed, querying packages one by one: {}", e);
                self.adb.clone()
            }
        }
    }

    fn view_model(&self, packages: Arc<dyn PackageQuery>) -> StoreViewModel {
        let operations = Arc::new(AppOperationsQueue::new(OperationBackend {
            api: self.api.clone(),
            packages: packages.clone(),
            actions: self.adb.clone(),
            shared_store: self.shared_store.clone(),
            download_dir: self.config.download_dir.clone(),
        }));

        StoreViewModel {
            api: self.api.clone(),
            packages,
            actions: self.adb.clone(),
            prefs: self.prefs.clone(),
            badge: Arc::new(UnsupportedBadge),
            shared_store: self.shared_store.clone(),
            operations,
            self_package_prefix: self.settings.self_package_prefix.clone(),
        }
    }

    fn worker(&self, packages: Arc<dyn PackageQuery>) -> UpdateCheckWorker {
        UpdateCheckWorker::new(
            self.api.clone(),
            packages,
            self.prefs.clone(),
            Arc::new(UnsupportedBadge),
            Arc::new(LogNotifier),
        )
        .with_shared_store(self.shared_store.clone())
    }

    /// Load the catalog into a view model, failing only when nothing can be shown.
    fn loaded_view_model(&self) -> Result<StoreViewModel> {
        let vm = self.view_model(self.packages());
        if let Err(e) = vm.load_apps() {
            if let UiState::Error(message) = vm.ui_state() {
                bail!("Failed to load apps: {}", message);
            }
            tracing::warn!("Showing cached apps: {}", e);
        }
        Ok(vm)
    }
}

fn state_label(view: &AppViewState) -> String {
    match view.state {
        AppState::NotInstalled => "available".to_string(),
        AppState::Installed => "installed".to_string(),
        AppState::UpdateAvailable => "update".to_string(),
        AppState::Downloading => format!("{:>3.0}%", view.progress * 100.0),
    }
}

fn print_views(views: &[AppViewState]) {
    if views.is_empty() {
        println!("No apps");
        return;
    }
    for view in views {
        let version = match (&view.installed_version, view.state) {
            (Some(installed), AppState::UpdateAvailable) => {
                format!("{} -> {}", installed, view.app.version)
            }
            _ => view.app.version.clone(),
        };
        println!(
            "{:<10} {:<28} {:<40} {}",
            state_label(view),
            view.app.name,
            view.app.package_name,
            version
        );
    }
}

fn find_view(vm: &StoreViewModel, package: &str) -> Result<AppViewState> {
    vm.find_app(package)
        .with_context(|| format!("{} is not in the catalog", package))
}

/// Run queued operations on the worker thread, printing download progress.
fn run_operations(vm: &StoreViewModel, key: &str) -> Result<()> {
    vm.operations.start_worker();
    let mut last_percent = None;
    while vm.operations.is_running() {
        if let Some(progress) = vm.shared_store.get_download_progress().get(key) {
            let percent = (progress * 100.0) as u32;
            if last_percent != Some(percent) {
                eprint!("\rDownloading... {:>3}%", percent);
                last_percent = Some(percent);
            }
        }
        thread::sleep(Duration::from_millis(200));
    }
    if last_percent.is_some() {
        eprintln!();
    }

    match vm.operations.get_status(key) {
        Some(OperationStatus::Success(message)) => {
            println!("{}", message);
            Ok(())
        }
        Some(OperationStatus::Error(message)) => bail!(message),
        _ => bail!("Operation for {} did not run", key),
    }
}

/// Apply log level changes saved to the settings file while running.
fn follow_log_level(config: &Config, mut current: LogLevel) -> ! {
    loop {
        thread::sleep(SETTINGS_POLL_INTERVAL);
        match config.load_settings() {
            Ok(settings) => {
                let level = LogLevel::parse(&settings.log_level);
                if level != current {
                    log_capture::update_tracing_level(level);
                    tracing::info!("Log level changed to {}", level.as_filter());
                    current = level;
                }
            }
            Err(e) => tracing::warn!("Could not re-read settings: {:#}", e),
        }
    }
}

fn run(cli: Cli, config: Config, settings: Settings) -> Result<()> {
    let Some(command) = cli.command else {
        println!("MindApps v{}", env!("CARGO_PKG_VERSION"));
        println!("Run 'mindapps --help' for usage information");
        return Ok(());
    };

    let level_pinned = cli.log_level.is_some();
    let store = Store::open(config, settings, cli.device)?;

    match command {
        Commands::List { tab } => {
            let vm = store.loaded_view_model()?;
            if !store.prefs.is_setup_completed() {
                println!("Welcome to MindApps. Installed catalog apps were added to your library.");
                store.prefs.set_setup_completed(true)?;
            }
            let views = match tab {
                Tab::All => match vm.ui_state() {
                    UiState::Success(views) => views,
                    _ => Vec::new(),
                },
                Tab::Library => vm.tabs().library,
                Tab::Discover => vm.tabs().discover,
                Tab::Updates => vm.tabs().updates,
            };
            print_views(&views);
        }
        Commands::Check => {
            let worker = store.worker(store.packages());
            let updates = worker.run_check()?;
            if updates.is_empty() {
                println!("All apps are up to date");
            }
            for update in updates {
                println!(
                    "{}: {} -> {}",
                    update.app_name, update.current_version, update.new_version
                );
            }
        }
        Commands::Updates { clear } => {
            let last_check = store.prefs.last_update_check();
            if last_check == 0 {
                println!("No update check has run yet");
            } else if let Some(at) = chrono::DateTime::from_timestamp_millis(last_check) {
                println!("Last checked {}", at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M"));
            }
            for update in store.prefs.available_update_records() {
                println!(
                    "{:<28} {:<40} {} -> {}",
                    update.app_name, update.package_name, update.current_version, update.new_version
                );
            }
            store.worker(Arc::new(PackageSnapshot::new())).clear_notification();
            if clear {
                store.prefs.clear_available_updates()?;
                println!("Cleared stored update results");
            }
        }
        Commands::Install { package } => {
            let vm = store.loaded_view_model()?;
            let view = find_view(&vm, &package)?;
            match vm.on_app_action(&view)? {
                ActionOutcome::Queued => run_operations(&vm, &view.app.package_name)?,
                ActionOutcome::Opened(_) => println!("{} is already up to date", view.app.name),
                ActionOutcome::Ignored => println!("{} is already downloading", view.app.name),
            }
        }
        Commands::Uninstall { package } => {
            let vm = store.loaded_view_model()?;
            let key = match vm.find_app(&package) {
                Some(view) => {
                    vm.uninstall(&view.app);
                    view.app.package_name
                }
                None => {
                    vm.operations.enqueue_uninstall(&package);
                    package
                }
            };
            run_operations(&vm, &key)?;
        }
        Commands::Open { package } => {
            let vm = store.loaded_view_model()?;
            let view = find_view(&vm, &package)?;
            if !matches!(view.state, AppState::Installed | AppState::UpdateAvailable) {
                bail!("{} is not installed", view.app.name);
            }
            let candidates = PackageCandidates::parse(&view.app.package_name);
            if !open_app(vm.packages.as_ref(), vm.actions.as_ref(), &candidates) {
                bail!("Could not launch {}", view.app.name);
            }
            println!("Launched {}", view.app.name);
        }
        Commands::Library { action } => match action {
            LibraryAction::List => {
                for package in store.prefs.library_app_ids() {
                    println!("{}", package);
                }
            }
            LibraryAction::Add { package } => {
                store.prefs.add_to_library(&package)?;
                println!("Added {} to library", package);
            }
            LibraryAction::Remove { package } => {
                store.prefs.remove_from_library(&package)?;
                println!("Removed {} from library", package);
            }
        },
        Commands::Notifications { state } => {
            let enabled = state == Toggle::On;
            store.prefs.set_update_notifications_enabled(enabled)?;
            println!(
                "Update notifications {}",
                if enabled { "enabled" } else { "disabled" }
            );
        }
        Commands::Watch { interval_hours } => {
            let hours = interval_hours.unwrap_or(store.settings.check_interval_hours).max(1);
            let worker = Arc::new(store.worker(store.adb.clone()));
            let scheduler = UpdateScheduler::new(worker, Duration::from_secs(hours * 60 * 60));
            scheduler.schedule_periodic();
            println!("Checking for updates every {} hour(s), press Ctrl-C to stop", hours);
            if level_pinned {
                loop {
                    thread::park();
                }
            }
            follow_log_level(&store.config, LogLevel::parse(&store.settings.log_level))
        }
        Commands::LogLevel { level } => {
            let level = LogLevel::parse(&level);
            // saved from the file as-is so environment overrides stay out of it
            let mut saved = store.config.load_settings()?;
            saved.log_level = level.as_filter().to_string();
            store.config.save_settings(&saved)?;
            log_capture::update_tracing_level(level);
            println!("Log level set to {}", level.as_filter());
        }
        Commands::Devices => {
            let devices = adb::get_devices().context("Failed to run adb")?;
            if devices.is_empty() {
                println!("No devices attached");
            }
            for device in devices {
                println!("{}", device);
            }
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    // Initialize tracing subscriber for structured logging with log capture and reload support
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::reload;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;

    let cli = Cli::parse();

    let config = Config::new()?;
    let mut settings = match config.load_settings() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Ignoring unreadable settings: {:#}", e);
            Settings::default()
        }
    };
    settings.apply_env_overrides();

    let log_level = LogLevel::parse(cli.log_level.as_deref().unwrap_or(&settings.log_level));

    // Create a reloadable filter layer for dynamic log level changes
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_filter()));
    let (filter, reload_handle) = reload::Layer::new(env_filter);

    log_capture::set_reload_fn(move |level: LogLevel| {
        if let Err(e) = reload_handle.reload(EnvFilter::new(level.as_filter())) {
            eprintln!("Failed to reload log filter: {}", e);
        }
    });
    log_capture::set_capture_level(log_level);

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(log_capture::LogCaptureLayer)
        .init();

    let show_logs = cli.show_logs || settings.show_logs;
    let result = run(cli, config, settings);

    if show_logs {
        for line in log_capture::recent_logs(200) {
            eprintln!("{}", line);
        }
    }
    result
}
