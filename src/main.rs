use shotreel::cli::{Args, BuildArgs, BumpTarget, Command};
use shotreel::config::paths::{LOG_FILE, PREFS_FILE};
use shotreel::config::project::DEFAULT_PROJECT;
use shotreel::config::{self, PathConfig, Preferences, ProjectConfig};
use shotreel::core::path_parser;
use shotreel::core::scanner::ProjectScanner;
use shotreel::entities::{MemoryHost, TimelineHost, TimelineId, TrackId, TrackKind};
use shotreel::error::ConfigError;
use shotreel::progress::ConsoleProgress;
use shotreel::timeline::{AudioSynchronizer, DepartmentSwitcher, TimelineBuilder, TimelineConfig, VersionUpdater};
use shotreel::validate::validate_project_structure;

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use log::{debug, info, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Session file name in the data directory
const SESSION_FILE: &str = "session.json";

/// Everything a command needs, resolved once at startup.
struct App {
    args: Args,
    path_config: PathConfig,
    prefs: Preferences,
    project: ProjectConfig,
    progress: ConsoleProgress,
}

fn main() -> Result<()> {
    // Parse command-line arguments first (needed for log setup)
    let args = Args::parse();

    // Create path configuration from CLI args and environment
    let path_config = PathConfig::from_env_and_cli(args.config_dir.clone());

    // Ensure directories exist
    if let Err(e) = config::ensure_dirs(&path_config) {
        eprintln!("Warning: Failed to create application directories: {}", e);
    }

    init_logging(&args, &path_config)?;

    info!("shotreel {} starting", env!("CARGO_PKG_VERSION"));
    debug!("Command-line args: {:?}", args);
    info!("Config path: {}", config::config_file(PREFS_FILE, &path_config).display());

    let prefs_path = config::config_file(PREFS_FILE, &path_config);
    let prefs = Preferences::load(&prefs_path);
    let project = resolve_project(&args, &path_config, &prefs)?;
    info!(
        "Project '{}' at {}",
        project.project_name,
        project.project_root.display()
    );

    let progress = if args.quiet {
        ConsoleProgress::hidden()
    } else {
        ConsoleProgress::new(&project.project_name)
    };

    let mut app = App {
        args,
        path_config,
        prefs,
        project,
        progress,
    };
    app.run()?;

    if let Err(e) = app.prefs.save(&prefs_path) {
        warn!("Failed to save preferences: {}", e);
    }
    Ok(())
}

fn init_logging(args: &Args, path_config: &PathConfig) -> Result<()> {
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = log_path_opt
            .as_ref()
            .cloned()
            .unwrap_or_else(|| config::data_file(LOG_FILE, path_config));

        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        // Console logging (respects RUST_LOG if set)
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };

        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .format_timestamp_millis()
            .init();
    }
    Ok(())
}

/// `--config` file, else the named (or last used) project, else a bare
/// config around `--root`.
fn resolve_project(args: &Args, path_config: &PathConfig, prefs: &Preferences) -> Result<ProjectConfig> {
    let mut project = if let Some(path) = &args.config_file {
        ProjectConfig::load(path).with_context(|| format!("Cannot load project config {}", path.display()))?
    } else {
        let name = args
            .project
            .clone()
            .or_else(|| prefs.last_project.clone())
            .unwrap_or_else(|| DEFAULT_PROJECT.to_string());
        let dir = config::projects_dir(path_config);
        match ProjectConfig::load_named(&dir, &name) {
            Ok(project) => project,
            Err(ConfigError::NotFound(_)) if args.root.is_some() => {
                debug!("No config for '{}', using --root only", name);
                ProjectConfig::new(name, args.root.clone().unwrap_or_default())
            }
            Err(e) => {
                return Err(anyhow::Error::new(e).context(format!(
                    "No usable project '{}' in {} (pass --root or --config)",
                    name,
                    dir.display()
                )));
            }
        }
    };

    if let Some(root) = &args.root {
        project.project_root = root.clone();
    }
    Ok(project)
}

impl App {
    fn run(&mut self) -> Result<()> {
        let command = self.args.command.clone();
        match &command {
            Command::Scan { episodes, json } => self.scan(episodes, *json),
            Command::Build(build) => self.build(build),
            Command::Bump { timeline, target } => self.bump(timeline, target),
            Command::SwitchDept { timeline, department } => self.switch_department(timeline, department),
            Command::SyncAudio {
                timeline,
                audio_dir,
                track_name,
            } => self.sync_audio(timeline, audio_dir.as_deref(), track_name),
            Command::Validate => self.validate(),
            Command::ClearCache => {
                self.scanner()?.invalidate_cache();
                println!("Cache cleared");
                Ok(())
            }
        }
    }

    fn scanner(&self) -> Result<ProjectScanner> {
        let cache = self.project.cache_manager(&self.path_config);
        if self.args.no_cache || !self.prefs.cache_enabled {
            cache.set_enabled(false);
        }
        let parser = self.project.path_parser().context("Invalid naming patterns")?;
        let mut scanner = ProjectScanner::new(&self.project.project_root, cache)
            .with_parser(parser)
            .with_progress(self.progress.callback());
        if let Some(workers) = self.args.workers {
            scanner = scanner.with_max_workers(workers);
        }
        Ok(scanner)
    }

    fn session_path(&self) -> PathBuf {
        self.args
            .session
            .clone()
            .unwrap_or_else(|| config::data_file(SESSION_FILE, &self.path_config))
    }

    fn load_session(&self) -> Result<MemoryHost> {
        let path = self.session_path();
        if !path.exists() {
            info!("New session for project {}", self.project.project_name);
            return Ok(MemoryHost::new(&self.project.project_name));
        }
        MemoryHost::from_json(&path).with_context(|| format!("Cannot read session {}", path.display()))
    }

    fn save_session(&self, host: &MemoryHost) -> Result<()> {
        let path = self.session_path();
        host.to_json(&path)
            .with_context(|| format!("Cannot write session {}", path.display()))
    }

    fn scan(&mut self, episodes: &[String], json: bool) -> Result<()> {
        let scanner = self.scanner()?;
        let selection = (!episodes.is_empty()).then_some(episodes);
        let result = scanner.scan_full(selection);
        self.progress.finish(&format!("{} shots", result.total_shots()));

        if json {
            print_json(&result)?;
            return Ok(());
        }
        for (episode, sequences) in &result.episodes {
            println!("{}", episode);
            for (sequence, shots) in sequences {
                println!("  {} ({} shots)", sequence, shots.len());
                for shot in shots.values() {
                    let departments: Vec<String> = shot
                        .departments
                        .values()
                        .map(|d| format!("{}:{}", d.name, d.current_version.as_deref().unwrap_or("-")))
                        .collect();
                    println!("    {}  {}", shot.shot, departments.join(" "));
                }
            }
        }
        println!(
            "{} sequences, {} shots in {:.2}s",
            result.total_sequences(),
            result.total_shots(),
            result.scan_time.as_secs_f64()
        );
        Ok(())
    }

    fn build(&mut self, build: &BuildArgs) -> Result<()> {
        let scanner = self.scanner()?;
        let all_sequences = path_parser::sort_sequences(&scanner.scan_sequences(&build.episode));
        let sequences = if build.sequences.is_empty() {
            all_sequences.clone()
        } else {
            build.sequences.clone()
        };
        if sequences.is_empty() {
            bail!("No sequences found for episode {}", build.episode);
        }

        let settings = &self.project.settings;
        let color_space = build
            .color_space
            .clone()
            .or_else(|| (!settings.color_space.is_empty()).then(|| settings.color_space.clone()));
        let config = TimelineConfig::new(
            &build.episode,
            sequences.clone(),
            build
                .department
                .clone()
                .or_else(|| (!settings.default_department.is_empty()).then(|| settings.default_department.clone()))
                .unwrap_or_else(|| self.prefs.default_department.clone()),
        )
        .with_version(build.version.clone())
        .with_media_type(build.media_type.unwrap_or(settings.default_media_type))
        .with_fps(build.fps.unwrap_or(settings.fps))
        .with_audio(!build.no_audio)
        .with_color_space(color_space)
        .with_all_sequences(all_sequences);

        let mut host = self.load_session()?;
        let builder = TimelineBuilder::new(scanner).with_progress(self.progress.callback());
        let result = builder.build_timeline(&mut host, &config)?;
        self.save_session(&host)?;
        self.progress.finish(&format!(
            "{} {}",
            if result.is_update { "Updated" } else { "Created" },
            result.timeline_name
        ));

        self.prefs.set_last_project(&self.project.project_name);
        self.prefs.set_last_selection(&build.episode, &sequences);
        print_json(&result)
    }

    fn bump(&mut self, timeline: &str, target: &BumpTarget) -> Result<()> {
        let mut host = self.load_session()?;
        let (_, video) = video_track(&host, timeline)?;
        let updater = VersionUpdater::new().with_progress(self.progress.callback());
        let result = if target.increment {
            updater.increment_all_versions(&mut host, video)?
        } else if target.decrement {
            updater.decrement_all_versions(&mut host, video)?
        } else if let Some(version) = &target.set {
            updater.update_all_versions(&mut host, video, version)?
        } else {
            bail!("Nothing to do: pass --increment, --decrement or --set");
        };
        self.save_session(&host)?;
        self.progress.finish(&format!("{} items updated", result.updated_count));
        print_json(&result)
    }

    fn switch_department(&mut self, timeline: &str, department: &str) -> Result<()> {
        let mut host = self.load_session()?;
        let (_, video) = video_track(&host, timeline)?;
        let switcher = DepartmentSwitcher::new().with_progress(self.progress.callback());
        let available = switcher.available_departments(&host, video)?;
        debug!("Departments on {}: {:?}", timeline, available);

        let result = switcher.switch_department(&mut host, video, department)?;
        self.save_session(&host)?;
        self.progress.finish(&format!("{} items on {}", result.success_count, department));
        print_json(&result)
    }

    fn sync_audio(&mut self, timeline: &str, audio_dir: Option<&Path>, track_name: &str) -> Result<()> {
        let audio_dir = audio_dir
            .map(Path::to_path_buf)
            .or_else(|| self.project.audio_dir())
            .ok_or_else(|| anyhow!("No audio directory: pass --audio-dir or set media_paths.audio_dir"))?;

        let mut host = self.load_session()?;
        let (timeline_id, video) = video_track(&host, timeline)?;
        let sync = AudioSynchronizer::new(audio_dir)
            .with_parser(self.project.path_parser()?)
            .with_progress(self.progress.callback());
        let (_, result) = sync.create_audio_track(&mut host, timeline_id, video, track_name)?;
        self.save_session(&host)?;
        self.progress.finish(&format!("{} shots with audio", result.matched_count));
        print_json(&result)
    }

    fn validate(&mut self) -> Result<()> {
        let parser = self.project.path_parser()?;
        let report = validate_project_structure(&self.project.project_root, &parser);
        for message in &report.messages {
            println!("[{}] {}", message.severity, message.message);
        }
        if !report.is_valid() {
            bail!("Project structure has {} error(s)", report.errors().len());
        }
        Ok(())
    }
}

fn video_track(host: &MemoryHost, timeline: &str) -> Result<(TimelineId, TrackId)> {
    let id = host
        .find_timeline(timeline)?
        .ok_or_else(|| anyhow!("No timeline named '{}' in session", timeline))?;
    let track = host
        .track(id, TrackKind::Video)?
        .ok_or_else(|| anyhow!("Timeline '{}' has no video track", timeline))?;
    Ok((id, track))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
