use clap::{Args, Subcommand};
use hps_reconcile::error::AppError;
use hps_reconcile::pdf::{extract_fields, fill_fields, FilledForm};
use hps_reconcile::workflows::clearance::TransferFormValues;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Subcommand, Debug)]
pub(crate) enum PdfCommand {
    /// Print the populated fields of a PDF form as JSON
    Extract(ExtractArgs),
    /// Fill a PDF form from a JSON map of label to value
    Fill(FillArgs),
}

#[derive(Args, Debug)]
pub(crate) struct ExtractArgs {
    /// PDF form to read
    pub(crate) input: PathBuf,
}

#[derive(Args, Debug)]
pub(crate) struct FillArgs {
    /// Template PDF with fillable fields
    pub(crate) template: PathBuf,
    /// JSON file with the values to write
    #[arg(long)]
    pub(crate) values: PathBuf,
    /// Interpret the values file as transfer form data instead of a label map
    #[arg(long)]
    pub(crate) transfer: bool,
    /// Where to write the filled PDF
    #[arg(long, short)]
    pub(crate) output: PathBuf,
}

pub(crate) fn run(command: PdfCommand) -> Result<(), AppError> {
    match command {
        PdfCommand::Extract(args) => extract(&args.input),
        PdfCommand::Fill(args) => fill(args),
    }
}

fn extract(input: &Path) -> Result<(), AppError> {
    let bytes = std::fs::read(input)?;
    let fields = extract_fields(&bytes)?;
    println!("{}", to_json(&fields)?);
    Ok(())
}

fn fill(args: FillArgs) -> Result<(), AppError> {
    let template = std::fs::read(&args.template)?;
    let raw = std::fs::read_to_string(&args.values)?;

    let filled: FilledForm = if args.transfer {
        let values: TransferFormValues = parse_json(&raw)?;
        values.fill(&template)?
    } else {
        let values: BTreeMap<String, String> = parse_json(&raw)?;
        fill_fields(&template, &values)?
    };

    std::fs::write(&args.output, &filled.bytes)?;
    info!(
        output = %args.output.display(),
        updated = filled.updated.len(),
        unmatched = filled.unmatched.len(),
        "form filled"
    );
    println!(
        "{}",
        to_json(&serde_json::json!({
            "output": args.output.display().to_string(),
            "updated": filled.updated,
            "unmatched": filled.unmatched,
        }))?
    );
    Ok(())
}

fn parse_json<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, AppError> {
    serde_json::from_str(raw)
        .map_err(|err| AppError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, err)))
}

pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> Result<String, AppError> {
    serde_json::to_string_pretty(value)
        .map_err(|err| AppError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, err)))
}
