use mailpipe::Label;
use mailpipe::config::Config;
use mailpipe::db::Store;
use std::env;

const USAGE: &str = "Usage: labels [--only] [--label <name>]
Lists labels saved by the last download.
  --only, -o          only user labels
  --label, -l <name>  print the id of one label";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Help,
    List { user_only: bool },
    Lookup(String),
}

fn parse_args(args: &[String]) -> Result<Command, String> {
    let mut user_only = false;
    let mut lookup = None;
    let mut iter = args.iter().skip(1);

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--help" | "-h" => return Ok(Command::Help),
            "--only" | "-o" => user_only = true,
            "--label" | "-l" => match iter.next() {
                Some(name) if !name.starts_with('-') => lookup = Some(name.clone()),
                _ => return Err(format!("{} requires a label name", arg)),
            },
            other => return Err(format!("Unknown argument: {}", other)),
        }
    }

    Ok(match lookup {
        Some(name) => Command::Lookup(name),
        None => Command::List { user_only },
    })
}

/// One listing row. The name column holds the stored name, which is what
/// `--label` looks up.
fn row(label: &Label) -> String {
    format!("|{:>30}|{:<30}|", label.name, label.id)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    let command = match parse_args(&args) {
        Ok(Command::Help) => {
            println!("{}", USAGE);
            return Ok(());
        }
        Ok(command) => command,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    };

    let config = Config::load()?;
    let store = Store::new(&config.database_url)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;
    store.run_migrations().await?;

    match command {
        Command::Lookup(name) => match store.find_label_id(&name).await? {
            Some(id) => println!("{}", id),
            None => {
                eprintln!("Label {} not found.", name);
                std::process::exit(1);
            }
        },
        Command::List { user_only } => {
            let labels = store.get_labels(user_only).await?;
            if labels.is_empty() {
                println!("No labels stored. Run mailpipe first.");
            }
            for label in &labels {
                println!("{}", row(label));
            }
        }
        Command::Help => {}
    }

    store.close().await;
    Ok(())
}
