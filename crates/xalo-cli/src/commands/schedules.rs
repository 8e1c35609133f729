//! Schedule commands - list, create, edit, delete.
//!
//! `edit` applies gallery changes in a fixed order: moves (as given), then
//! removals (as given, each against the list as it stands after the previous
//! step), then new files appended in order. All indices are zero-based.

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::Args;
use owo_colors::OwoColorize;

use xalo_core::uploads::content_type_for;
use xalo_core::{Direction, GalleryDraft, PendingFile, Reconciled, Schedule, ScheduleId};

use crate::client::{ApiClient, HttpUploader, ScheduleBody};
use crate::{Config, OutputFormat};

/// Arguments for the create command.
#[derive(Debug, Args)]
pub struct CreateArgs {
    /// Calendar month (`YYYY-MM`).
    #[arg(long, short = 'm')]
    pub month: String,

    /// Optional title.
    #[arg(long, short = 't')]
    pub title: Option<String>,

    /// Image files, uploaded in this order.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

/// Arguments for the edit command.
#[derive(Debug, Args)]
pub struct EditArgs {
    /// Schedule ID.
    pub id: String,

    /// New title (empty string clears it).
    #[arg(long, short = 't')]
    pub title: Option<String>,

    /// New month (`YYYY-MM`).
    #[arg(long, short = 'm')]
    pub month: Option<String>,

    /// Move an existing image: `INDEX:up` or `INDEX:down`. Repeatable.
    #[arg(long = "move", value_name = "INDEX:DIR")]
    pub moves: Vec<MoveOp>,

    /// Remove an existing image by index. Repeatable.
    #[arg(long = "remove", value_name = "INDEX")]
    pub removes: Vec<usize>,

    /// Append a new image file. Repeatable; uploaded in order.
    #[arg(long = "add", value_name = "FILE")]
    pub adds: Vec<PathBuf>,
}

/// Arguments for the delete command.
#[derive(Debug, Args)]
pub struct DeleteArgs {
    /// Schedule ID.
    pub id: String,
}

/// One reorder step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveOp {
    /// Zero-based position in the current list.
    pub index: usize,
    /// Swap direction.
    pub direction: Direction,
}

impl FromStr for MoveOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (index, direction) = s
            .split_once(':')
            .ok_or_else(|| format!("expected INDEX:up|down, got '{s}'"))?;
        Ok(Self {
            index: index
                .trim()
                .parse()
                .map_err(|e| format!("bad index '{index}': {e}"))?,
            direction: direction.parse().map_err(|e| format!("{e}"))?,
        })
    }
}

/// Applies reorder and removal steps to a draft.
///
/// Steps that fall outside the list change nothing and are reported back.
pub fn apply_edits(draft: &mut GalleryDraft, moves: &[MoveOp], removes: &[usize]) -> Vec<String> {
    let mut ignored = Vec::new();
    for op in moves {
        if !draft.move_existing(op.index, op.direction) {
            ignored.push(format!("move {}:{:?} has no effect", op.index, op.direction));
        }
    }
    for &index in removes {
        if draft.remove_existing(index).is_none() {
            ignored.push(format!("remove {index} is out of range"));
        }
    }
    ignored
}

/// Reads local files into pending uploads.
///
/// # Errors
///
/// Returns an error if any file cannot be read.
pub async fn read_files(paths: &[PathBuf]) -> Result<Vec<PendingFile>> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        let content_type = content_type_for(&name);
        files.push(PendingFile::new(name, content_type, bytes));
    }
    Ok(files)
}

fn report_failures(reconciled: &Reconciled) {
    for failed in &reconciled.failed {
        eprintln!(
            "{} skipped '{}': {}",
            "warning:".yellow(),
            failed.name,
            failed.error
        );
    }
}

fn parse_id(raw: &str) -> Result<ScheduleId> {
    raw.parse()
        .with_context(|| format!("'{raw}' is not a schedule ID"))
}

/// Execute the list command.
///
/// # Errors
///
/// Returns an error if the API request fails.
pub async fn list(config: &Config) -> Result<()> {
    let client = ApiClient::new(config)?;
    let schedules = client.list_schedules().await?;

    match config.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&schedules)?);
        }
        OutputFormat::Text => {
            if schedules.is_empty() {
                println!("No schedules found");
                return Ok(());
            }
            for schedule in &schedules {
                println!(
                    "  {} {} ({} images) {}",
                    schedule.month.to_string().bold(),
                    schedule.title.as_deref().unwrap_or("-"),
                    schedule.images.len(),
                    schedule.id.dimmed()
                );
            }
        }
        OutputFormat::Table => {
            use tabled::{Table, Tabled};

            #[derive(Tabled)]
            struct ScheduleRow {
                #[tabled(rename = "Month")]
                month: String,
                #[tabled(rename = "Title")]
                title: String,
                #[tabled(rename = "Images")]
                images: usize,
                #[tabled(rename = "ID")]
                id: String,
            }

            let rows: Vec<_> = schedules
                .iter()
                .map(|s| ScheduleRow {
                    month: s.month.to_string(),
                    title: s.title.clone().unwrap_or_default(),
                    images: s.images.len(),
                    id: s.id.to_string(),
                })
                .collect();

            if rows.is_empty() {
                println!("No schedules found");
            } else {
                println!("{}", Table::new(rows));
            }
        }
    }
    Ok(())
}

/// Execute the create command.
///
/// # Errors
///
/// Returns an error if a file cannot be read, every upload fails, or the API
/// request fails.
pub async fn create(args: CreateArgs, config: &Config) -> Result<()> {
    let client = ApiClient::new(config)?;
    let mut draft = GalleryDraft::new();
    draft.stage_all(read_files(&args.files).await?);

    let reconciled = draft
        .submit(&HttpUploader::new(client.clone()))
        .await
        .context("No image could be uploaded")?;
    report_failures(&reconciled);

    let schedule = client
        .create_schedule(&ScheduleBody {
            month: Some(args.month),
            title: args.title,
            images: Some(reconciled.images),
        })
        .await?;
    print_schedule("Schedule created", &schedule, config)
}

/// Execute the edit command.
///
/// # Errors
///
/// Returns an error if the schedule does not exist, the gallery would end up
/// empty, or the API request fails.
pub async fn edit(args: EditArgs, config: &Config) -> Result<()> {
    let id = parse_id(&args.id)?;
    let client = ApiClient::new(config)?;

    let touches_gallery = !(args.moves.is_empty() && args.removes.is_empty() && args.adds.is_empty());
    let images = if touches_gallery {
        let current = client.find_schedule(id).await?;
        let mut draft = GalleryDraft::from_existing(current.images);
        for note in apply_edits(&mut draft, &args.moves, &args.removes) {
            eprintln!("{} {note}", "note:".dimmed());
        }
        draft.stage_all(read_files(&args.adds).await?);

        let reconciled = draft
            .submit(&HttpUploader::new(client.clone()))
            .await
            .context("The gallery needs at least one image")?;
        report_failures(&reconciled);
        Some(reconciled.images)
    } else {
        None
    };

    let schedule = client
        .update_schedule(
            id,
            &ScheduleBody {
                month: args.month,
                title: args.title,
                images,
            },
        )
        .await?;
    print_schedule("Schedule updated", &schedule, config)
}

/// Execute the delete command.
///
/// # Errors
///
/// Returns an error if the ID is malformed or the API request fails.
pub async fn delete(args: &DeleteArgs, config: &Config) -> Result<()> {
    let id = parse_id(&args.id)?;
    let client = ApiClient::new(config)?;
    let response = client.delete_schedule(id).await?;

    match config.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&response)?),
        OutputFormat::Text | OutputFormat::Table => println!("{}", response.message.green()),
    }
    Ok(())
}

fn print_schedule(headline: &str, schedule: &Schedule, config: &Config) -> Result<()> {
    match config.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(schedule)?);
        }
        OutputFormat::Text | OutputFormat::Table => {
            println!("{}", headline.green());
            println!();
            println!("  ID:    {}", schedule.id);
            println!("  Month: {}", schedule.month);
            if let Some(title) = &schedule.title {
                println!("  Title: {title}");
            }
            println!("  Images:");
            for (index, url) in schedule.images.iter().enumerate() {
                println!("    [{index}] {url}");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: EditArgs,
    }

    #[test]
    fn edit_args_collect_repeated_steps() {
        let cli = TestCli::parse_from([
            "test",
            "01J0000000000000000000000A",
            "--move",
            "2:up",
            "--move",
            "0:down",
            "--remove",
            "1",
            "--add",
            "new.jpg",
            "--title",
            "",
        ]);
        assert_eq!(
            cli.args.moves,
            vec![
                MoveOp { index: 2, direction: Direction::Up },
                MoveOp { index: 0, direction: Direction::Down },
            ]
        );
        assert_eq!(cli.args.removes, vec![1]);
        assert_eq!(cli.args.adds, vec![PathBuf::from("new.jpg")]);
        assert_eq!(cli.args.title.as_deref(), Some(""));
    }

    #[test]
    fn move_op_rejects_garbage() {
        assert!("up".parse::<MoveOp>().is_err());
        assert!("x:up".parse::<MoveOp>().is_err());
        assert!("1:sideways".parse::<MoveOp>().is_err());
    }

    #[test]
    fn edits_apply_moves_then_removals() {
        let mut draft = GalleryDraft::from_existing(["a", "b", "c"].map(String::from));
        let ignored = apply_edits(
            &mut draft,
            &[MoveOp { index: 2, direction: Direction::Up }],
            &[0],
        );
        assert!(ignored.is_empty());
        assert_eq!(draft.existing(), ["c".to_string(), "b".to_string()]);
    }

    #[test]
    fn boundary_steps_are_reported_and_harmless() {
        let mut draft = GalleryDraft::from_existing(["a", "b"].map(String::from));
        let ignored = apply_edits(
            &mut draft,
            &[
                MoveOp { index: 0, direction: Direction::Up },
                MoveOp { index: 1, direction: Direction::Down },
            ],
            &[5],
        );
        assert_eq!(ignored.len(), 3);
        assert_eq!(draft.existing(), ["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn read_files_infers_content_type() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("poster.webp");
        tokio::fs::write(&path, b"webp").await?;

        let files = read_files(&[path]).await?;
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "poster.webp");
        assert_eq!(files[0].content_type, "image/webp");
        Ok(())
    }
}
