///
/// This module implements the CLI interface for lessonkit: command parsing,
/// input loading, and the JSON payload printed for every command.
///
/// All document and AI logic lives in the [`lessonkit-core`] crate. This
/// module only reads inputs, calls into the core, publishes produced files
/// into the outputs directory and shapes the result.
///
/// ## Output contract
/// - Success: a JSON object, usually `{"success": true, ...}`, returned by [`run`]
///   and printed to stdout by the binary.
/// - Failure: [`run`] returns an error; the binary prints `{"detail": message}`
///   to stderr and exits with [`exit_code`].
///
/// [`lessonkit-core`]: ../../lessonkit-core/
use crate::load_config::{load_settings, Credentials};
use crate::providers::{build_chain, provider_status};
use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use futures::future::try_join_all;
use lessonkit_core::assistant::{self, TextAssistant};
use lessonkit_core::config::Settings;
use lessonkit_core::content::ContentGenerator;
use lessonkit_core::ingest::Ingestor;
use lessonkit_core::pages::PageSelection;
use lessonkit_core::pdf::{self, DocumentPartition};
use lessonkit_core::repair::ExpectedShape;
use lessonkit_core::store::{ArtifactStore, StoredArtifact};
use lessonkit_core::{deck, Error, ErrorClass};
use serde_json::{json, Value};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

/// CLI for lessonkit: PDF and slide tooling plus AI-assisted teaching content.
#[derive(Parser, Debug)]
#[clap(
    name = "lessonkit",
    version,
    about = "Process teaching documents and generate lesson content with AI providers"
)]
pub struct Cli {
    /// Path to a YAML settings file
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// PDF operations
    #[clap(subcommand)]
    Pdf(PdfCommand),
    /// Slide deck (.pptx) operations
    #[clap(subcommand)]
    Deck(DeckCommand),
    /// AI text assistant
    #[clap(subcommand)]
    Ai(AiCommand),
    /// AI content generation
    #[clap(subcommand)]
    Content(ContentCommand),
    /// Store a file in the uploads directory
    Upload { file: PathBuf },
    /// Size and readability of a stored upload
    FileInfo { name: String },
    /// Report which AI providers have credentials
    Health,
    /// Remove stored files that no running operation owns
    Cleanup {
        /// Only remove files older than the configured maximum age
        #[clap(long)]
        expired: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum PdfCommand {
    /// Extract all text
    ExtractText { file: PathBuf },
    /// Extract text, returning only the first chunk of long documents
    ExtractTextLarge { file: PathBuf },
    /// Concatenate PDFs in the given order
    Merge {
        #[clap(required = true, num_args = 1..)]
        files: Vec<PathBuf>,
    },
    /// Copy selected pages into a new PDF
    Select {
        file: PathBuf,
        /// Comma-separated 1-based page numbers, e.g. "1,3,5"
        #[clap(long)]
        pages: String,
    },
    /// Stamp a diagonal text watermark on every page
    Watermark {
        file: PathBuf,
        #[clap(long)]
        text: String,
    },
    /// Page count, encryption and metadata
    Info { file: PathBuf },
    /// Split into parts and bundle them into a zip archive
    Split {
        file: PathBuf,
        /// Pages per part; defaults to limits.pages_per_part
        #[clap(long)]
        pages_per_part: Option<NonZeroUsize>,
    },
    /// Best-effort size reduction
    Compress { file: PathBuf },
}

#[derive(Subcommand, Debug)]
pub enum DeckCommand {
    /// Titles and text of every slide
    ExtractText { file: PathBuf },
    /// Slide count and size
    Info { file: PathBuf },
    /// Build a new deck: a title slide, then one slide per entry of --slides
    Create {
        #[clap(long)]
        title: String,
        /// JSON array of {"title": ..., "content": ...} objects
        #[clap(long)]
        slides: Option<PathBuf>,
    },
    /// Append a title-and-content slide
    AddSlide {
        file: PathBuf,
        #[clap(long)]
        title: String,
        #[clap(long, default_value = "")]
        content: String,
    },
    /// Replace the title and text of one slide
    ModifySlide {
        file: PathBuf,
        /// 1-based slide number
        #[clap(long)]
        slide: usize,
        #[clap(long)]
        title: String,
        #[clap(long, default_value = "")]
        content: String,
    },
}

/// Text given inline or read from a file.
#[derive(Args, Debug)]
pub struct TextInput {
    #[clap(required_unless_present = "file")]
    pub text: Option<String>,
    /// Read the text from this file instead
    #[clap(long, conflicts_with = "text")]
    pub file: Option<PathBuf>,
}

impl TextInput {
    async fn resolve(&self) -> Result<String> {
        match (&self.text, &self.file) {
            (Some(text), _) => Ok(text.clone()),
            (None, Some(path)) => match tokio::fs::read_to_string(path).await {
                Ok(text) => Ok(text),
                Err(e) => {
                    tracing::error!(error = ?e, path = %path.display(), "Failed to read text input");
                    Err(not_found_or_io(e, path).into())
                }
            },
            (None, None) => Err(Error::InvalidSelection("no text given".to_string()).into()),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum AiCommand {
    /// Improve clarity, grammar and flow
    Improve {
        #[clap(flatten)]
        input: TextInput,
        #[clap(long, default_value = assistant::DEFAULT_CONTEXT)]
        context: String,
    },
    Summarize {
        #[clap(flatten)]
        input: TextInput,
        #[clap(long, default_value_t = assistant::DEFAULT_MAX_WORDS)]
        max_words: u32,
    },
    /// Multiple-choice questions about the text
    Questions {
        #[clap(flatten)]
        input: TextInput,
        #[clap(long, default_value_t = assistant::DEFAULT_QUESTION_COUNT)]
        count: u32,
        #[clap(long, default_value = assistant::DEFAULT_DIFFICULTY)]
        difficulty: String,
    },
    Translate {
        #[clap(flatten)]
        input: TextInput,
        /// Target language
        #[clap(long, default_value = assistant::DEFAULT_TARGET_LANGUAGE)]
        to: String,
    },
    /// Fix grammar and spelling
    Grammar {
        #[clap(flatten)]
        input: TextInput,
    },
    /// Rewrite for a lower reading level
    Simplify {
        #[clap(flatten)]
        input: TextInput,
        #[clap(long, default_value = assistant::DEFAULT_TARGET_GRADE)]
        grade: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ContentCommand {
    LessonPlan {
        #[clap(long)]
        subject: String,
        #[clap(long)]
        grade: String,
        #[clap(long)]
        topic: String,
        #[clap(long, default_value = "50 minutes")]
        duration: String,
    },
    Exercises {
        #[clap(long)]
        subject: String,
        #[clap(long)]
        topic: String,
        #[clap(long, default_value_t = 5)]
        count: u32,
        #[clap(long, default_value = assistant::DEFAULT_DIFFICULTY)]
        difficulty: String,
    },
    /// Slide-by-slide presentation outline
    Outline {
        #[clap(long)]
        topic: String,
        #[clap(long, default_value_t = 10)]
        slides: u32,
        #[clap(long, default_value = "students")]
        audience: String,
    },
    StudyGuide {
        #[clap(long)]
        subject: String,
        /// Comma-separated topics
        #[clap(long, value_delimiter = ',', required = true)]
        topics: Vec<String>,
        #[clap(long)]
        grade: String,
    },
}

/// Process exit status for a failed command: 2 for caller mistakes, 1 otherwise.
pub fn exit_code(error: &anyhow::Error) -> u8 {
    match error.downcast_ref::<Error>().map(Error::class) {
        Some(ErrorClass::Client) => 2,
        _ => 1,
    }
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<Value> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    let settings = load_settings(cli.config.as_deref())?;
    settings.trace_loaded();

    let result = match cli.command {
        Commands::Pdf(command) => {
            let store = ArtifactStore::open(&settings.storage)?;
            run_pdf(command, &settings, &store).await
        }
        Commands::Deck(command) => {
            let store = ArtifactStore::open(&settings.storage)?;
            run_deck(command, &settings, &store).await
        }
        Commands::Ai(command) => run_ai(command, &settings).await,
        Commands::Content(command) => run_content(command, &settings).await,
        Commands::Upload { file } => {
            let store = ArtifactStore::open(&settings.storage)?;
            let ingestor = Ingestor::new(&store, &settings.limits);
            let bytes = read_input(&ingestor, &file).await?;
            let stored = ingestor.ingest_upload(&bytes, &display_name(&file)).await?;
            Ok(json!({
                "success": true,
                "filename": stored.file_name(),
                "path": stored.path(),
                "size": stored.size(),
            }))
        }
        Commands::FileInfo { name } => {
            let store = ArtifactStore::open(&settings.storage)?;
            let info = store.file_info(&name)?;
            Ok(json!({"success": true, "info": info}))
        }
        Commands::Health => {
            let mut payload = json!({"status": "healthy"});
            for (provider, configured) in provider_status(&settings.ai, &Credentials::from_env()) {
                payload[format!("{provider}_configured")] = json!(configured);
            }
            Ok(payload)
        }
        Commands::Cleanup { expired } => {
            let store = ArtifactStore::open(&settings.storage)?;
            let report = if expired {
                store.purge_expired(settings.limits.max_artifact_age())?
            } else {
                store.purge_all()?
            };
            Ok(json!({
                "success": true,
                "message": "Temporary files removed",
                "removed": report.removed,
                "skipped_live": report.skipped_live,
            }))
        }
    };

    match &result {
        Ok(_) => tracing::info!("Command completed"),
        Err(e) => tracing::error!(error = %e, "Command failed"),
    }
    result
}

async fn run_pdf(command: PdfCommand, settings: &Settings, store: &ArtifactStore) -> Result<Value> {
    let ingestor = Ingestor::new(store, &settings.limits);
    match command {
        PdfCommand::ExtractText { file } => {
            let source = ingest_file(&ingestor, &file).await?;
            let text = blocking(move || pdf::extract_text(&source)).await?;
            Ok(json!({"success": true, "text": text, "filename": display_name(&file)}))
        }
        PdfCommand::ExtractTextLarge { file } => {
            let source = ingest_file(&ingestor, &file).await?;
            let text = blocking(move || pdf::extract_text(&source)).await?;
            let mut chunks = pdf::text_chunks(&text, settings.limits.text_chunk_chars);
            if chunks.len() <= 1 {
                return Ok(json!({"success": true, "text": text, "filename": display_name(&file)}));
            }
            let total_chunks = chunks.len();
            Ok(json!({
                "success": true,
                "text": chunks.swap_remove(0),
                "total_chunks": total_chunks,
                "filename": display_name(&file),
                "message": format!("Text extracted in {total_chunks} parts. Showing the first part."),
            }))
        }
        PdfCommand::Merge { files } => {
            let sources = try_join_all(files.iter().map(|f| ingest_file(&ingestor, f))).await?;
            let store = store.clone();
            let published = blocking(move || {
                let refs: Vec<&StoredArtifact> = sources.iter().collect();
                let merged = pdf::merge(&store, &refs)?;
                store.publish(merged, "merged.pdf")
            })
            .await?;
            Ok(json!({"success": true, "path": published.path(), "sources": files.len()}))
        }
        PdfCommand::Select { file, pages } => {
            let selection: PageSelection = pages.parse()?;
            let source = ingest_file(&ingestor, &file).await?;
            let store = store.clone();
            let (published, pages, out_of_range) = blocking(move || {
                let selected = pdf::select_pages(&store, &source, &selection)?;
                let published = store.publish(selected.artifact, "split.pdf")?;
                Ok((published, selected.pages, selected.out_of_range))
            })
            .await?;
            Ok(json!({
                "success": true,
                "path": published.path(),
                "pages": pages,
                "out_of_range": out_of_range,
            }))
        }
        PdfCommand::Watermark { file, text } => {
            let source = ingest_file(&ingestor, &file).await?;
            let store = store.clone();
            let published = blocking(move || {
                let stamped = pdf::watermark(&store, &source, &text)?;
                store.publish(stamped, "watermarked.pdf")
            })
            .await?;
            Ok(json!({"success": true, "path": published.path()}))
        }
        PdfCommand::Info { file } => {
            let source = ingest_file(&ingestor, &file).await?;
            let info = blocking(move || pdf::info(&source)).await?;
            Ok(json!({"success": true, "info": info, "filename": display_name(&file)}))
        }
        PdfCommand::Split {
            file,
            pages_per_part,
        } => {
            let per_part = match pages_per_part {
                Some(n) => n,
                None => NonZeroUsize::new(settings.limits.pages_per_part).ok_or_else(|| {
                    Error::InvalidSelection("pages_per_part must be at least 1".to_string())
                })?,
            };
            let source = ingest_file(&ingestor, &file).await?;
            let archive_name = format!("split_{}.zip", display_name(&file));
            let store = store.clone();
            let split = blocking(move || {
                let partition = pdf::partition(&store, &source, per_part)?;
                if let DocumentPartition::Whole(_) = partition {
                    return Ok(None);
                }
                let bundle = pdf::bundle(
                    &store,
                    &partition.artifacts(),
                    &archive_name,
                    pdf::part_entry_name,
                )?;
                let published = store.publish(bundle, &archive_name)?;
                Ok(Some((published, partition.len())))
            })
            .await?;
            match split {
                None => {
                    tracing::info!(file = %file.display(), "No split needed");
                    Ok(json!({
                        "success": true,
                        "message": "no split needed",
                        "filename": display_name(&file),
                    }))
                }
                Some((published, parts)) => {
                    Ok(json!({"success": true, "path": published.path(), "parts": parts}))
                }
            }
        }
        PdfCommand::Compress { file } => {
            let source = ingest_file(&ingestor, &file).await?;
            let original_size = source.size();
            let published_name = format!("compressed_{}", display_name(&file));
            let store = store.clone();
            let (published, compressed_size) = blocking(move || {
                let compressed = pdf::compress(&store, &source)?;
                let compressed_size = compressed.size();
                Ok((store.publish(compressed, &published_name)?, compressed_size))
            })
            .await?;
            Ok(json!({
                "success": true,
                "path": published.path(),
                "original_size": original_size,
                "compressed_size": compressed_size,
            }))
        }
    }
}

async fn run_deck(command: DeckCommand, settings: &Settings, store: &ArtifactStore) -> Result<Value> {
    let ingestor = Ingestor::new(store, &settings.limits);
    match command {
        DeckCommand::ExtractText { file } => {
            let source = ingest_file(&ingestor, &file).await?;
            let content = blocking(move || deck::extract_text(&source)).await?;
            Ok(json!({"success": true, "content": content, "filename": display_name(&file)}))
        }
        DeckCommand::Info { file } => {
            let source = ingest_file(&ingestor, &file).await?;
            let info = blocking(move || deck::info(&source)).await?;
            Ok(json!({"success": true, "info": info, "filename": display_name(&file)}))
        }
        DeckCommand::Create { title, slides } => {
            let slides = match slides {
                Some(path) => read_slides(&ingestor, &path).await?,
                None => Vec::new(),
            };
            let count = slides.len() + 1;
            let store = store.clone();
            let published = blocking(move || {
                let created = deck::create(&store, &title, &slides)?;
                store.publish(created, &format!("{title}.pptx"))
            })
            .await?;
            Ok(json!({"success": true, "path": published.path(), "slides": count}))
        }
        DeckCommand::AddSlide {
            file,
            title,
            content,
        } => {
            let source = ingest_file(&ingestor, &file).await?;
            let store = store.clone();
            let published = blocking(move || {
                let updated = deck::add_slide(&store, &source, &title, &content)?;
                store.publish(updated, "updated.pptx")
            })
            .await?;
            Ok(json!({"success": true, "path": published.path()}))
        }
        DeckCommand::ModifySlide {
            file,
            slide,
            title,
            content,
        } => {
            let source = ingest_file(&ingestor, &file).await?;
            let store = store.clone();
            let published = blocking(move || {
                let modified = deck::modify_slide(&store, &source, slide, &title, &content)?;
                store.publish(modified, "modified.pptx")
            })
            .await?;
            Ok(json!({"success": true, "path": published.path(), "slide": slide}))
        }
    }
}

async fn run_ai(command: AiCommand, settings: &Settings) -> Result<Value> {
    let chain = build_chain(&settings.ai, &Credentials::from_env());
    let assistant = TextAssistant::new(&chain);
    let payload = match command {
        AiCommand::Improve { input, context } => {
            let text = input.resolve().await?;
            json!({"success": true, "improved_text": assistant.improve_text(&text, &context).await?})
        }
        AiCommand::Summarize { input, max_words } => {
            let text = input.resolve().await?;
            json!({"success": true, "summary": assistant.summarize(&text, max_words).await?})
        }
        AiCommand::Questions {
            input,
            count,
            difficulty,
        } => {
            let text = input.resolve().await?;
            let questions = assistant
                .generate_questions(&text, count, &difficulty)
                .await?;
            json!({"success": true, "questions": questions.into_json(ExpectedShape::Array)})
        }
        AiCommand::Translate { input, to } => {
            let text = input.resolve().await?;
            json!({"success": true, "translation": assistant.translate(&text, &to).await?})
        }
        AiCommand::Grammar { input } => {
            let text = input.resolve().await?;
            json!({"success": true, "corrected_text": assistant.correct_grammar(&text).await?})
        }
        AiCommand::Simplify { input, grade } => {
            let text = input.resolve().await?;
            json!({"success": true, "simplified_text": assistant.simplify_text(&text, &grade).await?})
        }
    };
    Ok(payload)
}

async fn run_content(command: ContentCommand, settings: &Settings) -> Result<Value> {
    let chain = build_chain(&settings.ai, &Credentials::from_env());
    let generator = ContentGenerator::new(&chain);
    let payload = match command {
        ContentCommand::LessonPlan {
            subject,
            grade,
            topic,
            duration,
        } => {
            let plan = generator
                .lesson_plan(&subject, &grade, &topic, &duration)
                .await?;
            json!({"success": true, "lesson_plan": plan.into_json(ExpectedShape::Object)})
        }
        ContentCommand::Exercises {
            subject,
            topic,
            count,
            difficulty,
        } => {
            let exercises = generator
                .exercises(&subject, &topic, count, &difficulty)
                .await?;
            json!({"success": true, "exercises": exercises.into_json(ExpectedShape::Array)})
        }
        ContentCommand::Outline {
            topic,
            slides,
            audience,
        } => {
            let outline = generator
                .presentation_outline(&topic, slides, &audience)
                .await?;
            json!({"success": true, "outline": outline.into_json(ExpectedShape::Array)})
        }
        ContentCommand::StudyGuide {
            subject,
            topics,
            grade,
        } => {
            let guide = generator.study_guide(&subject, &topics, &grade).await?;
            json!({"success": true, "study_guide": guide.into_json(ExpectedShape::Object)})
        }
    };
    Ok(payload)
}

/// Runs synchronous document work off the async runtime threads.
async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> std::result::Result<T, Error> + Send + 'static,
    T: Send + 'static,
{
    let output = tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| anyhow::anyhow!("Document task failed: {e}"))??;
    Ok(output)
}

/// Reads the slide list for `deck create`.
async fn read_slides(ingestor: &Ingestor<'_>, path: &Path) -> Result<Vec<deck::SlideContent>> {
    let bytes = read_input(ingestor, path).await?;
    serde_json::from_slice(&bytes).map_err(|e| {
        tracing::error!(error = %e, path = %path.display(), "Failed to parse slides file");
        Error::MalformedDocument(format!("slides file {}: {e}", path.display())).into()
    })
}

/// Reads a local file after checking its size against the ingestion ceiling.
async fn read_input(ingestor: &Ingestor<'_>, path: &Path) -> std::result::Result<Vec<u8>, Error> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| not_found_or_io(e, path))?;
    ingestor.check_size(metadata.len())?;
    tokio::fs::read(path).await.map_err(|e| not_found_or_io(e, path))
}

/// Copies a local file into scratch storage as a scoped artifact.
async fn ingest_file(ingestor: &Ingestor<'_>, path: &Path) -> std::result::Result<StoredArtifact, Error> {
    let bytes = read_input(ingestor, path).await?;
    ingestor.ingest(&bytes, &display_name(path)).await
}

fn not_found_or_io(e: std::io::Error, path: &Path) -> Error {
    if e.kind() == std::io::ErrorKind::NotFound {
        Error::NotFound(path.display().to_string())
    } else {
        Error::Io(e)
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string())
}
