#[macro_use]
extern crate log;

use std::path::{Path, PathBuf};

use streamgrab::{
    client,
    config::Config,
    progress::{format_bytes, ConsoleProgress},
    session::{LookupOutcome, Session},
};

const DEFAULT_CONFIG: &str = "streamgrab.toml";

struct Args {
    url: String,
    mp3: bool,
    config: Option<PathBuf>,
}

fn parse_args() -> Option<Args> {
    let mut url = None;
    let mut mp3 = false;
    let mut config = None;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config = Some(PathBuf::from(args.next()?)),
            "mp3" => mp3 = true,
            _ if url.is_none() => url = Some(arg),
            _ => return None,
        }
    }

    Some(Args {
        url: url?,
        mp3,
        config,
    })
}

fn load_config(path: Option<&Path>) -> Config {
    match path {
        Some(path) => Config::load(path).expect("Could not load config"),
        None if Path::new(DEFAULT_CONFIG).exists() => {
            Config::load(Path::new(DEFAULT_CONFIG)).expect("Could not load config")
        }
        None => Config::default(),
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let Some(args) = parse_args() else {
        eprintln!("Usage: streamgrab <url> [mp3] [--config <path>]");
        std::process::exit(2);
    };

    let config = load_config(args.config.as_deref());
    let session = Session::from_config(&config).expect("Could not create session");

    println!("Looking up {}", args.url);
    let lookup = match session.lookup(&args.url).await {
        Ok(LookupOutcome::Ready(lookup)) => lookup,
        Ok(_) => {
            eprintln!("No video id found in {:?}", args.url);
            std::process::exit(1);
        }
        Err(e) => {
            error!("Lookup failed: {:?}", e);
            eprintln!("{}", e.user_message());
            std::process::exit(1);
        }
    };

    let meta = &lookup.metadata;
    println!("Title:    {}", meta.title.as_deref().unwrap_or("(untitled)"));
    println!("Uploader: {}", meta.uploader.as_deref().unwrap_or("(unknown)"));
    println!("Duration: {}:{:02}", meta.duration / 60, meta.duration % 60);
    match lookup.video_link() {
        Ok(url) => println!("Video:    {}", url),
        Err(e) => println!("Video:    {}", e.user_message()),
    }

    if !args.mp3 {
        return;
    }

    let file = match session.convert_audio(&lookup, &ConsoleProgress).await {
        Ok(file) => file,
        Err(e) => {
            error!("Conversion failed: {:?}", e);
            eprintln!("{}", e.user_message());
            std::process::exit(1);
        }
    };

    let size = client::write_file(Path::new(&file.file_name), &file.bytes)
        .await
        .expect("Could not write output file");
    println!("Saved {} ({})", file.file_name, format_bytes(size as u64));
}
