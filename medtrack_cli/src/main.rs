use chrono::{DateTime, Duration, Local};
use clap::{Args, Parser, Subcommand};
use medtrack_core::timefmt::{format_date_time, format_time, parse_picker_value};
use medtrack_core::*;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "medtrack")]
#[command(about = "Medication schedule and dose tracker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show every medication with its next dose (default)
    List,

    /// Show the full dose history of one or all medications
    History {
        /// Medication id or unique id prefix
        id: Option<String>,
    },

    /// Add a medication and schedule all of its doses
    Add(AddArgs),

    /// Edit a medication
    Edit(EditArgs),

    /// Delete a medication and its history
    Delete {
        id: String,

        /// Do not ask for confirmation
        #[arg(long)]
        yes: bool,
    },

    /// Set the status of one dose (taken, skipped, pending)
    Mark {
        id: String,

        /// Dose number as shown in the history (starting at 1)
        #[arg(value_parser = clap::value_parser!(u32).range(1..))]
        dose: u32,

        status: DoseStatus,
    },

    /// Mark the next pending dose as taken
    Take { id: String },

    /// Show when the next dose is due
    Remind { id: String },

    /// Export every dose to a CSV file
    Export { path: PathBuf },
}

#[derive(Args)]
struct AddArgs {
    #[arg(long)]
    name: String,

    /// Dose description, e.g. "500 mg"
    #[arg(long)]
    dose: String,

    #[arg(long)]
    presentation: Option<String>,

    /// Route of administration
    #[arg(long)]
    route: Option<String>,

    /// Total number of doses
    #[arg(long)]
    count: u32,

    /// Hours between doses
    #[arg(long)]
    every: u32,

    /// First dose time, YYYY-MM-DDTHH:MM (local time)
    #[arg(long, value_parser = parse_first_dose)]
    first: DateTime<Local>,
}

#[derive(Args)]
struct EditArgs {
    id: String,

    #[arg(long)]
    name: Option<String>,

    #[arg(long)]
    dose: Option<String>,

    /// Pass an empty string to clear
    #[arg(long)]
    presentation: Option<String>,

    /// Pass an empty string to clear
    #[arg(long)]
    route: Option<String>,

    #[arg(long)]
    count: Option<u32>,

    #[arg(long)]
    every: Option<u32>,

    #[arg(long, value_parser = parse_first_dose)]
    first: Option<DateTime<Local>>,

    /// Recalculate the history if the schedule changed (resets every dose to pending)
    #[arg(long, conflicts_with = "keep_history")]
    regenerate: bool,

    /// Keep the existing history even if the schedule changed
    #[arg(long, conflicts_with = "regenerate")]
    keep_history: bool,
}

fn parse_first_dose(value: &str) -> std::result::Result<DateTime<Local>, String> {
    parse_picker_value(value)
        .ok_or_else(|| format!("invalid first dose time {:?}, expected YYYY-MM-DDTHH:MM", value))
}

fn main() -> Result<()> {
    let config = Config::load()?;
    medtrack_core::logging::init_with_level(&config.logging.level);

    let cli = Cli::parse();
    let data_dir = cli.data_dir.unwrap_or_else(|| config.data.data_dir.clone());
    tracing::debug!("Using data directory {:?}", data_dir);

    match cli.command {
        Some(Commands::List) | None => cmd_list(&data_dir),
        Some(Commands::History { id }) => cmd_history(&data_dir, id.as_deref()),
        Some(Commands::Add(args)) => cmd_add(&data_dir, args),
        Some(Commands::Edit(args)) => cmd_edit(&data_dir, args),
        Some(Commands::Delete { id, yes }) => cmd_delete(&data_dir, &id, yes),
        Some(Commands::Mark { id, dose, status }) => cmd_mark(&data_dir, &id, dose, status),
        Some(Commands::Take { id }) => cmd_take(&data_dir, &id),
        Some(Commands::Remind { id }) => cmd_remind(&data_dir, &id, &config),
        Some(Commands::Export { path }) => cmd_export(&data_dir, &path),
    }
}

/// Open the tracker and surface anything recovered from while loading
fn open_tracker(data_dir: &Path) -> Result<Tracker<FileStore>> {
    let tracker = Tracker::open(FileStore::new(data_dir))?;
    for warning in tracker.warnings() {
        eprintln!("Warning: {}", warning);
    }
    Ok(tracker)
}

/// Resolve a user-supplied id or prefix to the full id
fn resolve_id(tracker: &Tracker<FileStore>, id: &str) -> Result<String> {
    Ok(tracker.resolve(id)?.id.clone())
}

fn cmd_list(data_dir: &Path) -> Result<()> {
    let tracker = open_tracker(data_dir)?;

    if tracker.medications().is_empty() {
        println!("No medications yet. Add one with `medtrack add`.");
        return Ok(());
    }

    println!(
        "{:<20} {:<12} {:<17} {:>9}  {}",
        "MEDICATION", "DOSE", "NEXT DOSE", "PENDING", "ID"
    );
    for med in tracker.medications() {
        let next = match med.next_pending_dose() {
            Some(dose) => format_date_time(Some(&dose.scheduled_at)),
            None if med.remaining() == 0 => "Complete".into(),
            None => timefmt::NOT_AVAILABLE.into(),
        };
        println!(
            "{:<20} {:<12} {:<17} {:>9}  {}",
            med.name,
            med.dose,
            next,
            format!("{}/{}", med.remaining(), med.initial_dose_count),
            med.id
        );
    }

    Ok(())
}

fn cmd_history(data_dir: &Path, id: Option<&str>) -> Result<()> {
    let tracker = open_tracker(data_dir)?;

    let selected: Vec<&Medication> = match id {
        Some(id) => vec![tracker.resolve(id)?],
        None => tracker.medications().iter().collect(),
    };

    if selected.is_empty() {
        println!("No medications yet.");
        return Ok(());
    }

    for med in selected {
        let summary = med.summary();
        println!(
            "{} ({} ✓, {} ✕, {} ?)  [{}]",
            med.name, summary.taken, summary.skipped, summary.pending, med.id
        );
        println!(
            "  {} | {} | every {}h | first dose {} | {} doses",
            med.presentation.as_deref().unwrap_or(timefmt::NOT_AVAILABLE),
            med.route.as_deref().unwrap_or(timefmt::NOT_AVAILABLE),
            med.frequency_hours,
            format_date_time(med.first_dose_at.as_ref()),
            med.initial_dose_count
        );

        let doses = med.history_by_time();
        if doses.is_empty() {
            println!("  No history calculated.");
        }
        for dose in doses {
            println!(
                "  Dose {:>3}: {}  {}",
                dose.index + 1,
                format_date_time(Some(&dose.scheduled_at)),
                dose.status
            );
        }
        println!();
    }

    Ok(())
}

fn cmd_add(data_dir: &Path, args: AddArgs) -> Result<()> {
    let mut tracker = open_tracker(data_dir)?;

    let draft = MedicationDraft {
        name: args.name,
        dose: args.dose,
        presentation: args.presentation,
        route: args.route,
        initial_dose_count: args.count,
        frequency_hours: args.every,
        first_dose_at: args.first,
    };

    let id = tracker.create(draft)?;
    let med = tracker.medication(&id)?;
    println!("✓ Added \"{}\" with {} doses", med.name, med.history.len());
    println!("  Id: {}", med.id);
    if let Some(next) = med.next_pending_dose() {
        println!("  First dose: {}", format_date_time(Some(&next.scheduled_at)));
    }

    Ok(())
}

fn cmd_edit(data_dir: &Path, args: EditArgs) -> Result<()> {
    let mut tracker = open_tracker(data_dir)?;
    let id = resolve_id(&tracker, &args.id)?;
    let current = tracker.medication(&id)?;

    let first_dose_at = match (args.first, current.first_dose_at) {
        (Some(first), _) | (None, Some(first)) => first,
        (None, None) => {
            return Err(Error::Validation(format!(
                "{} has no first dose time; pass --first",
                current.name
            )))
        }
    };

    let draft = MedicationDraft {
        name: args.name.unwrap_or_else(|| current.name.clone()),
        dose: args.dose.unwrap_or_else(|| current.dose.clone()),
        presentation: args.presentation.or_else(|| current.presentation.clone()),
        route: args.route.or_else(|| current.route.clone()),
        initial_dose_count: args.count.unwrap_or(current.initial_dose_count),
        frequency_hours: args.every.unwrap_or(current.frequency_hours),
        first_dose_at,
    };

    match tracker.update(&id, draft)? {
        UpdateOutcome::Updated => {}
        UpdateOutcome::RegenerationRequired => {
            let confirmed = if args.regenerate {
                true
            } else if args.keep_history {
                false
            } else {
                confirm("Schedule changed. Recalculate history? Every dose will be reset to pending")?
            };

            if confirmed {
                tracker.regenerate_history(&id)?;
                println!("✓ History recalculated");
            } else {
                println!("Edit saved, history not recalculated.");
            }
        }
    }

    println!("✓ Updated \"{}\"", tracker.medication(&id)?.name);
    Ok(())
}

fn cmd_delete(data_dir: &Path, id: &str, yes: bool) -> Result<()> {
    let mut tracker = open_tracker(data_dir)?;
    let id = resolve_id(&tracker, id)?;
    let name = tracker.medication(&id)?.name.clone();

    if !yes && !confirm(&format!("Delete \"{}\" and its history?", name))? {
        println!("Nothing deleted.");
        return Ok(());
    }

    tracker.delete(&id)?;
    println!("✓ Deleted \"{}\"", name);
    Ok(())
}

fn cmd_mark(data_dir: &Path, id: &str, dose: u32, status: DoseStatus) -> Result<()> {
    let mut tracker = open_tracker(data_dir)?;
    let id = resolve_id(&tracker, id)?;
    let index = (dose - 1) as usize;

    match tracker.set_dose_status(&id, index, status) {
        Ok(()) => {
            println!("✓ Dose {} marked {}", dose, status);
            Ok(())
        }
        Err(e) if e.is_no_change() => {
            println!("Dose {} is already {}; nothing changed.", dose, status);
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn cmd_take(data_dir: &Path, id: &str) -> Result<()> {
    let mut tracker = open_tracker(data_dir)?;
    let id = resolve_id(&tracker, id)?;

    match tracker.take_next(&id) {
        Ok(index) => {
            let med = tracker.medication(&id)?;
            println!("✓ Dose {} of \"{}\" marked Taken", index + 1, med.name);
            match med.next_pending_dose() {
                Some(next) => println!(
                    "  Next dose: {}",
                    format_date_time(Some(&next.scheduled_at))
                ),
                None => println!("  All doses complete"),
            }
            Ok(())
        }
        Err(Error::NoPendingDose(_)) => {
            println!("No pending dose to mark.");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn cmd_remind(data_dir: &Path, id: &str, config: &Config) -> Result<()> {
    let tracker = open_tracker(data_dir)?;
    let med = tracker.resolve(id)?;

    match med.reminder(Local::now(), config.reminder.due_window()) {
        Reminder::NothingPending => {
            println!("No pending doses for {}.", med.name);
        }
        Reminder::Due { dose, overdue_by } => {
            println!(
                "Dose {} of {} ({}) is due now{}.",
                dose.index + 1,
                med.name,
                format_time(Some(&dose.scheduled_at)),
                if overdue_by > Duration::zero() {
                    format!(", {} late", human_duration(overdue_by))
                } else {
                    String::new()
                }
            );
        }
        Reminder::Upcoming { dose, due_in } => {
            println!(
                "Next dose of {} at {} (in {}).",
                med.name,
                format_date_time(Some(&dose.scheduled_at)),
                human_duration(due_in)
            );
            println!("Remember to mark it with `medtrack take {}`.", med.id);
        }
    }

    Ok(())
}

fn cmd_export(data_dir: &Path, path: &Path) -> Result<()> {
    let tracker = open_tracker(data_dir)?;
    let rows = export::write_history_csv(tracker.medications(), path)?;
    println!("✓ Exported {} doses to {}", rows, path.display());
    Ok(())
}

fn human_duration(d: Duration) -> String {
    let minutes = d.num_minutes();
    let (days, hours, minutes) = (minutes / 1440, (minutes % 1440) / 60, minutes % 60);
    if days > 0 {
        format!("{}d {}h {:02}m", days, hours, minutes)
    } else {
        format!("{}h {:02}m", hours, minutes)
    }
}

fn confirm(question: &str) -> Result<bool> {
    print!("{} [y/N] ", question);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    Ok(matches!(input.trim().to_lowercase().as_str(), "y" | "yes"))
}
