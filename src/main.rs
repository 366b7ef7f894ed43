use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use lector::config::Config;
use lector::feed::FeedFetcher;
use lector::library::Library;
use lector::storage::{
    Article, ArticleFilter, Database, DatabaseError, LegacyFile, MigrationOutcome,
};
use lector::util::normalize_feed_url;

/// Characters of the article id shown in listings and accepted as a prefix.
const SHORT_ID_LEN: usize = 12;

/// Get the config directory path (~/.config/lector/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("lector"))
}

#[derive(Parser, Debug)]
#[command(name = "lector", version, about = "Personal RSS/Atom reader")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List subscribed feeds
    Feeds,
    /// Subscribe to a feed
    Add {
        url: String,
        /// Display name (defaults to the feed's own title)
        #[arg(long)]
        name: Option<String>,
    },
    /// Unsubscribe from a feed and delete its articles
    Remove { url: String },
    /// List articles, newest first
    Articles(FilterArgs),
    /// Fetch every feed and store new articles
    Refresh,
    /// Mark an article as read
    Read { id: String },
    /// Toggle an article's read flag
    ToggleRead { id: String },
    /// Toggle an article's starred flag
    Star { id: String },
    /// Mark every article matching the filter as read
    MarkAllRead(FilterArgs),
}

#[derive(Args, Debug)]
struct FilterArgs {
    /// Only articles of this feed URL
    #[arg(long, conflicts_with_all = ["unread", "starred"])]
    feed: Option<String>,
    /// Only unread articles
    #[arg(long, conflicts_with = "starred")]
    unread: bool,
    /// Only starred articles
    #[arg(long)]
    starred: bool,
}

impl FilterArgs {
    fn filter(&self) -> ArticleFilter {
        match (&self.feed, self.unread, self.starred) {
            (Some(url), _, _) => ArticleFilter::Feed(normalize_feed_url(url)),
            (None, true, _) => ArticleFilter::Unread,
            (None, false, true) => ArticleFilter::Starred,
            (None, false, false) => ArticleFilter::All,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config_dir = get_config_dir()?;
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
        println!("Created config directory: {}", config_dir.display());
    }

    // User-only access to the config directory
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) =
            std::fs::set_permissions(&config_dir, std::fs::Permissions::from_mode(0o700))
        {
            tracing::warn!(
                path = %config_dir.display(),
                error = %e,
                "Failed to set config directory permissions to 0700"
            );
        }
    }

    let config = Config::load(&config_dir.join("config.toml"))
        .context("Failed to load config.toml")?;

    let db_path = config.database_path(&config_dir);
    let db_path_str = db_path
        .to_str()
        .context("Database path is not valid UTF-8")?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            anyhow::bail!(DatabaseError::InstanceLocked);
        }
        Err(e) => return Err(e).context("Failed to open database"),
    };

    let legacy = LegacyFile::new(config.legacy_snapshot_path(&config_dir));
    match db
        .import_legacy_if_needed(&legacy)
        .await
        .context("Failed to import legacy data")?
    {
        MigrationOutcome::Imported {
            feeds,
            articles,
            skipped,
        } => println!(
            "Imported {} feeds and {} articles from {} ({} skipped)",
            feeds,
            articles,
            legacy.path().display(),
            skipped
        ),
        MigrationOutcome::AlreadyDone | MigrationOutcome::NoLegacyData => {}
    }

    let fetcher = FeedFetcher::with_limits(config.fetch_timeout(), config.max_redirects)
        .context("Failed to build HTTP client")?;
    let library = Library::new(db, fetcher);

    run(&library, cli.command).await
}

async fn run(library: &Library, command: Command) -> Result<()> {
    let db = library.database();

    match command {
        Command::Feeds => {
            for feed in db.list_feeds().await? {
                println!("{}\t{}", feed.name, feed.url);
            }
        }
        Command::Add { url, name } => {
            let feed = library.subscribe(&url, name.as_deref()).await?;
            println!("Subscribed to {} ({})", feed.name, feed.url);
        }
        Command::Remove { url } => {
            if library.unsubscribe(&url).await? {
                println!("Removed {}", url);
            } else {
                anyhow::bail!("Not subscribed to {}", url);
            }
        }
        Command::Articles(args) => {
            if let Some(articles) = library.load_articles(&args.filter()).await? {
                for article in &articles {
                    print_article(article);
                }
            }
        }
        Command::Refresh => {
            let report = library.refresh().await?;
            for (url, error) in &report.failures {
                eprintln!("{}: {}", url, error);
            }
            if report.has_failures() {
                println!(
                    "Refresh complete. {} new articles, {} feeds failed.",
                    report.inserted,
                    report.failures.len()
                );
            } else {
                println!("Refresh complete. {} new articles.", report.inserted);
            }
        }
        Command::Read { id } => {
            let id = resolve_article_id(db, &id).await?;
            db.mark_read(&id).await?;
        }
        Command::ToggleRead { id } => {
            let id = resolve_article_id(db, &id).await?;
            if let Some(read) = db.toggle_read(&id).await? {
                println!("{}", if read { "read" } else { "unread" });
            }
        }
        Command::Star { id } => {
            let id = resolve_article_id(db, &id).await?;
            if let Some(starred) = db.toggle_star(&id).await? {
                println!("{}", if starred { "starred" } else { "unstarred" });
            }
        }
        Command::MarkAllRead(args) => {
            let ids: Vec<String> = db
                .list_articles(&args.filter())
                .await?
                .into_iter()
                .map(|a| a.id)
                .collect();
            let changed = db.mark_all_read(&ids).await?;
            println!("Marked {} articles as read", changed);
        }
    }

    Ok(())
}

fn print_article(article: &Article) {
    let flags = format!(
        "{}{}",
        if article.is_read { ' ' } else { '*' },
        if article.is_starred { '+' } else { ' ' }
    );
    let short_id = article.id.get(..SHORT_ID_LEN).unwrap_or(&article.id);
    println!(
        "{} {} {}  [{}] {}",
        short_id, flags, article.published, article.feed_name, article.title
    );
}

/// Expand a (possibly shortened) article id to the full stored id.
async fn resolve_article_id(db: &Database, prefix: &str) -> Result<String> {
    if let Some(article) = db.get_article(prefix).await? {
        return Ok(article.id);
    }

    let mut matches = db
        .list_articles(&ArticleFilter::All)
        .await?
        .into_iter()
        .filter(|a| a.id.starts_with(prefix));

    match (matches.next(), matches.next()) {
        (Some(article), None) => Ok(article.id),
        (None, _) => anyhow::bail!("No article with id {}", prefix),
        (Some(_), Some(_)) => anyhow::bail!("Article id {} is ambiguous", prefix),
    }
}
