use std::io::Write;

#[tokio::main]
async fn main() {
	let mut opts;

	/* Parse console input */
	let parsed_options = {
		let args: Vec<String> = std::env::args().collect();

		opts = getopts::Options::new();
		opts.optflag( "h", "help",       "Show help");
		opts.optflag( "v", "verbose",    "Increased vebosity");
		opts.optflag( "y", "yes",        "Don't ask before installing");
		opts.optopt(  "r", "root",       "Keep every directory under ROOT instead of the user's data directories", "ROOT");
		opts.parsing_style(getopts::ParsingStyle::FloatingFrees);

		let parsed_options = match opts.parse(&args[1..]) {
			Ok(m)  => { m }
			Err(e) => { println!("Unable to parse options: {}", e); return }
		};

		if parsed_options.opt_present("h") {
			eprintln!("{}", opts.usage(USAGE));
			return;
		}

		parsed_options
	};

	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(
		if parsed_options.opt_present("v") { "debug" } else { "info" }
	)).init();

	let config = match parsed_options.opt_str("r") {
		Some(root) => depot_rs::Config::load_from_file(root_config_path(&root)).unwrap_or_else(|e| {
			log::warn!("Failed to read config file in {}: {}", root, e);
			depot_rs::Config::in_directory(&root)
		}),
		None => depot_rs::Config::load_from_disk().unwrap_or_else(|e| {
			log::warn!("Failed to read config file: {}", e);
			log::warn!("Using default config.");
			depot_rs::Config::default()
		}),
	};

	let Some(command) = parsed_options.free.first() else {
		eprintln!("{}", opts.usage(USAGE));
		return;
	};
	let arguments = &parsed_options.free[1..];

	let result = match command.as_str() {
		"add-repo" => add_repository(config, parsed_options.opt_str("r"), arguments),
		"refresh" => refresh(&config).await,
		"list" => list(&config).await,
		"install" => install(&config, arguments, parsed_options.opt_present("y")).await,
		"remove" => remove(&config, arguments).await,
		_ => Err(Error::UnknownCommand(command.clone())),
	};

	if let Err(e) = result {
		log::error!("{}", e);
		std::process::exit(1);
	}
}

const USAGE: &str = "Usage: depot-rs [options] <command>

Commands:
    add-repo <json|archive> <name> <location>
    refresh
    list
    install <id>...
    remove <id>...";

fn add_repository(mut config: depot_rs::Config, root: Option<String>, arguments: &[String]) -> Result<(), Error> {
	let [kind, name, location] = arguments else {
		return Err(Error::MissingArgument);
	};
	let repository = match kind.as_str() {
		"json" => depot_rs::RepositoryConfig::Json { name: name.clone(), location: location.clone() },
		"archive" => depot_rs::RepositoryConfig::Archive { name: name.clone(), location: location.clone() },
		_ => return Err(Error::UnknownRepositoryKind(kind.clone())),
	};
	config.add_repository(repository);

	match root {
		Some(root) => config.save_to_file(root_config_path(&root))?,
		None => config.save_to_disk()?,
	}
	log::info!("Added repository {}", name);
	Ok(())
}

fn root_config_path(root: &str) -> std::path::PathBuf {
	std::path::Path::new(root).join("config.json")
}

async fn open_db(config: &depot_rs::Config) -> Result<depot_rs::MetaDB, Error> {
	let mut db = depot_rs::MetaDB::from_config(config)?;
	match db.load_or_refresh().await {
		Ok(()) => Ok(db),
		Err(depot_rs::Error::SerdeJSON(e)) => {
			log::warn!("Failed to open MetaDB due to parsing error ({}), DB format likely changed. regenerating...", e);
			db.refresh_database().await?;
			Ok(db)
		},
		Err(e) => Err(e.into()),
	}
}

async fn refresh(config: &depot_rs::Config) -> Result<(), Error> {
	let mut db = depot_rs::MetaDB::from_config(config)?;
	/* Loaded first so install state survives the rebuild */
	if let Err(e) = db.load_from_disk() {
		log::debug!("No usable database to carry install state from: {}", e);
	}
	db.refresh_database().await?;
	println!("Database holds {} items.", db.items().len());
	Ok(())
}

async fn list(config: &depot_rs::Config) -> Result<(), Error> {
	let db = open_db(config).await?;
	for item in db.items() {
		let marker = if item.is_installed() { "*" } else if item.is_placeholder() { "?" } else { " " };
		println!("{} {}", marker, item);
	}
	Ok(())
}

async fn install(config: &depot_rs::Config, ids: &[String], assume_yes: bool) -> Result<(), Error> {
	if ids.is_empty() {
		return Err(Error::MissingArgument);
	}
	let db = open_db(config).await?;
	let manager = depot_rs::DownloadManager::from_config(config)?;

	let targets = ids.iter()
		.map(|id| db.get(id).ok_or_else(|| Error::UnknownItem(id.clone())))
		.collect::<Result<Vec<_>, _>>()?;

	println!("Installing:");
	for target in &targets {
		for item in db.items().closure(target).items.iter().filter(|i| !i.is_installed()) {
			println!("\t{}", item);
		}
	}

	if !assume_yes && !confirm("Commit changes? [(y)/n] ")? {
		return Err(Error::UserCancelled);
	}

	/* Report progress of everything we are about to touch */
	let _subscriptions = db.items().iter()
		.filter(|i| !i.is_installed())
		.map(|i| {
			let id = i.id().to_owned();
			i.progress().subscribe(move |event| log::info!("{}: {:?}", id, event))
		})
		.collect::<Vec<_>>();

	let mut failed = Vec::new();
	for target in targets {
		if !manager.acquire(db.items(), target).await {
			failed.push(target.id().to_owned());
		}
	}

	db.save_to_disk()?;

	if failed.is_empty() {
		println!("Done.");
		Ok(())
	} else {
		Err(Error::Acquisition(failed.join(", ")))
	}
}

async fn remove(config: &depot_rs::Config, ids: &[String]) -> Result<(), Error> {
	if ids.is_empty() {
		return Err(Error::MissingArgument);
	}
	let db = open_db(config).await?;
	let manager = depot_rs::DownloadManager::from_config(config)?;

	for id in ids {
		let item = db.get(id).ok_or_else(|| Error::UnknownItem(id.clone()))?;
		manager.remove(item).await?;
	}

	db.save_to_disk()?;
	Ok(())
}

fn confirm(prompt: &str) -> Result<bool, Error> {
	let stdin = std::io::stdin();
	loop {
		print!("{}", prompt);
		std::io::stdout().flush()?;
		let mut input = String::new();
		stdin.read_line(&mut input)?;
		let input = input.trim().to_lowercase();
		if input == "y" || input.is_empty() {
			return Ok(true);
		} else if input == "n" {
			return Ok(false);
		} else {
			println!("\nInput invalid.")
		}
	}
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("depot-rs error: {0}")]
	Depot(#[from] depot_rs::Error),
	#[error("IO error: {0}")]
	IO(#[from] std::io::Error),
	#[error("Missing argument")]
	MissingArgument,
	#[error("Unknown command {0}")]
	UnknownCommand(String),
	#[error("Unknown repository kind {0}, expected json or archive")]
	UnknownRepositoryKind(String),
	#[error("No item with id {0}")]
	UnknownItem(String),
	#[error("Failed to acquire {0}")]
	Acquisition(String),
	#[error("User cancelled an action")]
	UserCancelled,
}
