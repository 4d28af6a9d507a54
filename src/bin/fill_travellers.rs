//! Fill the traveller form from one or more files through a running server.
//!
//! Files are uploaded in order and merged into the same form, then any
//! `--set` edits are applied through the editor before the form is printed.

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use traveller_extractor::client::{UploadClient, UploadFile};
use traveller_extractor::controller::{FormController, Notice};
use traveller_extractor::form::SlotField;

#[derive(Parser, Debug)]
#[command(name = "fill-travellers", about = "Fill traveller details from documents with AI")]
struct Args {
    /// Files to upload (txt, csv, xlsx, xls, doc, docx, pdf, jpg, jpeg, png)
    #[arg(required = true)]
    files: Vec<std::path::PathBuf>,

    /// Server root URL
    #[arg(long, default_value = "http://localhost:3000")]
    server: String,

    /// Edit a slot after the uploads, e.g. `2:memberNumber=SJ-1234`
    #[arg(long = "set", value_name = "ID:FIELD=VALUE")]
    edits: Vec<String>,

    /// Print the form as JSON instead of the summary list
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "warn".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let mut controller = FormController::new(UploadClient::new(&args.server));

    let mut progress = controller.progress().subscribe();
    tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let state = progress.borrow_and_update().clone();
            if state.active {
                eprintln!("[{:>3}%] {}", state.percent, state.label);
            }
        }
    });

    for path in &args.files {
        // Wait for the previous upload's indicator to clear
        let mut idle = controller.progress().subscribe();
        idle.wait_for(|s| !s.active).await?;

        let file = UploadFile::from_path(path)
            .await
            .with_context(|| format!("cannot upload {}", path.display()))?;

        match controller.handle_file_upload(&file).await {
            Notice::Success(msg) => eprintln!("{}: {}", path.display(), msg),
            Notice::Error(msg) => eprintln!("{}: error: {}", path.display(), msg),
        }
    }

    for edit in &args.edits {
        apply_edit(&mut controller, edit).with_context(|| format!("invalid edit '{}'", edit))?;
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(controller.form().slots())?);
    } else {
        println!("Uppgifter om resenärer");
        for slot in controller.form().slots() {
            println!("  {}. {}", slot.id(), slot.summary_line());
        }
    }

    Ok(())
}

/// `ID:FIELD=VALUE` through the editor: select, set, save.
fn apply_edit(controller: &mut FormController, edit: &str) -> Result<()> {
    let Some((target, value)) = edit.split_once('=') else {
        bail!("expected ID:FIELD=VALUE");
    };
    let Some((id, field)) = target.split_once(':') else {
        bail!("expected ID:FIELD=VALUE");
    };

    let id: u8 = id.trim().parse().context("slot id must be 1-5")?;
    let field: SlotField = field.trim().parse()?;

    let form = controller.form_mut();
    form.select_slot(id)?;
    let editor = form.editor_mut()?;
    if let Err(e) = editor.set(field, value) {
        form.close_editor();
        return Err(e.into());
    }
    eprintln!("slot {}: {:?} = {}", id, field, editor.get(field));
    form.save_slot();
    Ok(())
}
