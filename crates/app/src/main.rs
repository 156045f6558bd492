use std::fmt;
use std::path::PathBuf;

use services::{
    AppConfig, AppServices, ArticleServiceError, Clock, ImageChange, ImageSource, QuizServiceError,
    SaveLocation, SaveMode, SaveOutcome, SaveWarning,
};
use study_core::model::{ArticleDraft, ArticleId, QuestionId};
use tracing_subscriber::{EnvFilter, fmt::time::ChronoLocal};

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingFlag { flag: &'static str },
    MissingCommand,
    UnknownArg(String),
    UnexpectedArgs(String),
    InvalidId { raw: String },
    InvalidNumber { flag: &'static str, raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingFlag { flag } => write!(f, "{flag} is required"),
            ArgsError::MissingCommand => write!(f, "missing command"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::UnexpectedArgs(args) => write!(f, "unexpected arguments: {args}"),
            ArgsError::InvalidId { raw } => write!(f, "invalid id: {raw:?}"),
            ArgsError::InvalidNumber { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  app [--db <sqlite_url>] list [--search <text>]");
    eprintln!("  app [--db <sqlite_url>] show <article-id>");
    eprintln!("  app [--db <sqlite_url>] create --title <t> --content <c> [--image <path>]");
    eprintln!("  app [--db <sqlite_url>] edit <article-id> --title <t> --content <c> [--image <path>]");
    eprintln!("  app [--db <sqlite_url>] delete <article-id>");
    eprintln!("  app [--db <sqlite_url>] quiz list [--category <name>]");
    eprintln!("  app [--db <sqlite_url>] quiz answer <question-id> <answer> [--elapsed <secs>]");
    eprintln!("  app [--db <sqlite_url>] progress");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  STUDY_DB_URL, STUDY_REMOTE_URL, STUDY_REMOTE_KEY, STUDY_IMAGE_BUCKET,");
    eprintln!("  STUDY_REMOTE_TIMEOUT_SECS, STUDY_AUTOSAVE_SECS, STUDY_LOG");
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    List {
        search: Option<String>,
    },
    Show {
        id: ArticleId,
    },
    Create {
        title: String,
        content: String,
        image: Option<PathBuf>,
    },
    Edit {
        id: ArticleId,
        title: String,
        content: String,
        image: Option<PathBuf>,
    },
    Delete {
        id: ArticleId,
    },
    QuizList {
        category: Option<String>,
    },
    QuizAnswer {
        question_id: QuestionId,
        answer: String,
        elapsed: u32,
    },
    Progress,
}

#[derive(Default)]
struct Flags {
    db: Option<String>,
    search: Option<String>,
    title: Option<String>,
    content: Option<String>,
    image: Option<String>,
    category: Option<String>,
    elapsed: Option<String>,
}

struct Args {
    db_url: Option<String>,
    command: Command,
}

impl Args {
    /// `Ok(None)` means help was requested.
    fn parse(argv: impl IntoIterator<Item = String>) -> Result<Option<Self>, ArgsError> {
        let mut args = argv.into_iter();
        let mut flags = Flags::default();
        let mut positionals: Vec<String> = Vec::new();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    flags.db = Some(value);
                }
                "--search" => flags.search = Some(require_value(&mut args, "--search")?),
                "--title" => flags.title = Some(require_value(&mut args, "--title")?),
                "--content" => flags.content = Some(require_value(&mut args, "--content")?),
                "--image" => flags.image = Some(require_value(&mut args, "--image")?),
                "--category" => flags.category = Some(require_value(&mut args, "--category")?),
                "--elapsed" => flags.elapsed = Some(require_value(&mut args, "--elapsed")?),
                "--help" | "-h" => return Ok(None),
                flag if flag.starts_with("--") => return Err(ArgsError::UnknownArg(arg)),
                _ => positionals.push(arg),
            }
        }

        let words: Vec<&str> = positionals.iter().map(String::as_str).collect();
        let command = match words.as_slice() {
            [] => return Err(ArgsError::MissingCommand),
            ["list"] => Command::List {
                search: flags.search.take(),
            },
            ["show", id] => Command::Show {
                id: parse_article_id(id)?,
            },
            ["create"] => Command::Create {
                title: flags.title.take().ok_or(ArgsError::MissingFlag { flag: "--title" })?,
                content: flags
                    .content
                    .take()
                    .ok_or(ArgsError::MissingFlag { flag: "--content" })?,
                image: flags.image.take().map(PathBuf::from),
            },
            ["edit", id] => Command::Edit {
                id: parse_article_id(id)?,
                title: flags.title.take().ok_or(ArgsError::MissingFlag { flag: "--title" })?,
                content: flags
                    .content
                    .take()
                    .ok_or(ArgsError::MissingFlag { flag: "--content" })?,
                image: flags.image.take().map(PathBuf::from),
            },
            ["delete", id] => Command::Delete {
                id: parse_article_id(id)?,
            },
            ["quiz", "list"] => Command::QuizList {
                category: flags.category.take(),
            },
            ["quiz", "answer", question_id, answer] => Command::QuizAnswer {
                question_id: question_id
                    .parse()
                    .map_err(|_| ArgsError::InvalidId {
                        raw: (*question_id).to_owned(),
                    })?,
                answer: (*answer).to_owned(),
                elapsed: match flags.elapsed.take() {
                    Some(raw) => raw.trim().parse().map_err(|_| ArgsError::InvalidNumber {
                        flag: "--elapsed",
                        raw: raw.clone(),
                    })?,
                    None => 0,
                },
            },
            ["progress"] => Command::Progress,
            _ => return Err(ArgsError::UnexpectedArgs(positionals.join(" "))),
        };

        Ok(Some(Self {
            db_url: flags.db,
            command,
        }))
    }
}

fn parse_article_id(raw: &str) -> Result<ArticleId, ArgsError> {
    raw.parse().map_err(|_| ArgsError::InvalidId {
        raw: raw.to_owned(),
    })
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") || raw.starts_with("sqlite:file:")
    {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

/// Make sure the database file and its directory exist; sqlx will not create them.
fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let Some(path) = db_url.strip_prefix("sqlite://") else {
        return Ok(());
    };
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

/// User-facing text for article failures. Not-found and total failure read
/// differently on purpose.
fn describe_article_error(err: &ArticleServiceError) -> String {
    match err {
        ArticleServiceError::NotFound(id) => format!("Article not found: {id}"),
        ArticleServiceError::Unavailable(_) => {
            "Failed to load articles. Please try again later.".to_owned()
        }
        ArticleServiceError::DeleteFailed { id, .. } => {
            format!("Failed to delete article {id}. Please try again later.")
        }
        other => other.to_string(),
    }
}

fn print_save(outcome: &SaveOutcome) {
    let place = match outcome.location {
        SaveLocation::Remote => "saved",
        SaveLocation::Local => "saved on this device (offline)",
    };
    println!("{} {place}", outcome.article.id);
    for warning in &outcome.warnings {
        match warning {
            SaveWarning::ImageUploadFailed => {
                eprintln!("warning: image upload failed; the article was saved without it");
            }
        }
    }
}

async fn execute(app: &AppServices, command: Command) -> Result<(), Box<dyn std::error::Error>> {
    let articles = app.articles();
    match command {
        Command::List { search } => {
            let list = match search.as_deref() {
                Some(query) => articles.search_articles(query).await,
                None => articles.list_articles().await,
            }
            .map_err(|e| describe_article_error(&e))?;
            if list.is_empty() {
                println!("No articles yet.");
            }
            for article in list {
                println!(
                    "{}  {}  {}",
                    article.id,
                    article.recency().format("%Y-%m-%d %H:%M"),
                    article.title
                );
                let preview = article.preview();
                if !preview.is_empty() {
                    println!("    {preview}");
                }
            }
        }
        Command::Show { id } => {
            let article = articles
                .get_article(&id)
                .await
                .map_err(|e| describe_article_error(&e))?;
            app.progress().track_article_view(&article.id).await;
            println!("# {}", article.title);
            if let Some(url) = &article.image_url {
                println!("[image] {url}");
            }
            println!();
            println!("{}", article.content);
        }
        Command::Create {
            title,
            content,
            image,
        } => {
            let outcome = articles
                .create_article(ArticleDraft::new(title, content), image.map(ImageSource::Path))
                .await
                .map_err(|e| describe_article_error(&e))?;
            print_save(&outcome);
        }
        Command::Edit {
            id,
            title,
            content,
            image,
        } => {
            let current = articles
                .get_article(&id)
                .await
                .map_err(|e| describe_article_error(&e))?;
            let change = match image {
                Some(path) => ImageChange::Replace {
                    source: ImageSource::Path(path),
                    previous: current.image_url,
                },
                None => ImageChange::Keep(current.image_url),
            };
            let outcome = articles
                .update_article(
                    &id,
                    ArticleDraft::new(title, content),
                    change,
                    SaveMode::Explicit,
                )
                .await
                .map_err(|e| describe_article_error(&e))?;
            print_save(&outcome);
        }
        Command::Delete { id } => {
            let outcome = articles
                .delete_article(&id)
                .await
                .map_err(|e| describe_article_error(&e))?;
            if outcome.remote_deleted || outcome.local_removed {
                println!("{id} deleted");
            } else {
                println!("{id} was already gone");
            }
        }
        Command::QuizList { category } => {
            let quiz = app.quiz();
            let questions = quiz.questions(category.as_deref());
            if questions.is_empty() {
                println!("No questions found.");
            }
            for question in questions {
                let category = question.category.as_deref().unwrap_or("Other");
                println!("[{}] ({category}) {}", question.id, question.question);
                for option in &question.options {
                    println!("    - {option}");
                }
            }
        }
        Command::QuizAnswer {
            question_id,
            answer,
            elapsed,
        } => {
            let result = match app
                .quiz()
                .submit_answer(&question_id, &answer, elapsed)
                .await
            {
                Ok(result) => result,
                Err(QuizServiceError::UnknownQuestion(id)) => {
                    return Err(format!("Question not found: {id}").into());
                }
                Err(err) => return Err(err.into()),
            };
            if result.correct {
                println!("Correct!");
            } else {
                println!("Incorrect. Accepted: {}", result.accepted_answers.join(", "));
            }
            if let Some(explanation) = result.explanation {
                println!("{explanation}");
            }
        }
        Command::Progress => {
            let stats = app.progress_stats().await;
            println!(
                "Quizzes: {} answered, {} correct, {} incorrect ({}%)",
                stats.total_quizzes, stats.correct_answers, stats.incorrect_answers, stats.accuracy
            );
            println!(
                "Articles: {} read of {} available",
                stats.articles_read, stats.total_articles
            );
            let trend: Vec<String> = stats.recent_scores.iter().map(u32::to_string).collect();
            println!("Recent sessions: {}", trend.join(" "));
            for (category, totals) in &stats.categories {
                println!("  {category}: {}/{}", totals.correct, totals.total);
            }
            if !stats.recent_articles.is_empty() {
                println!("Recently read:");
                for read in &stats.recent_articles {
                    println!(
                        "  {}  {} (x{})",
                        read.read_at.format("%Y-%m-%d %H:%M"),
                        read.title,
                        read.read_count
                    );
                }
            }
        }
    }
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let parsed = Args::parse(std::env::args().skip(1)).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;
    let Some(parsed) = parsed else {
        print_usage();
        return Ok(());
    };

    let mut config = AppConfig::from_env()?;
    if let Some(db_url) = parsed.db_url {
        config.db_url = db_url;
    }
    config.db_url = normalize_sqlite_url(config.db_url);
    if config.remote.is_none() {
        tracing::info!("STUDY_REMOTE_URL not set; articles are kept on this device");
    }

    // Open + migrate SQLite at startup. Keep this in the binary glue so core/services stay pure.
    prepare_sqlite_file(&config.db_url)?;
    let app = AppServices::new_sqlite(&config, Clock::default_clock()).await?;
    execute(&app, parsed.command).await
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S%.3f".to_string()))
        .with_env_filter(EnvFilter::from_env("STUDY_LOG"))
        .init();

    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
