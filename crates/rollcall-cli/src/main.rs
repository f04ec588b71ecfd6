use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rollcall_core::{BoundingBox, Detection, FaceCrop, FaceData};
use std::path::{Path, PathBuf};

// D-Bus proxy. `#[zbus::proxy]` generates `AttendanceProxy` (async) and a
// blocking variant; the CLI runs on tokio and uses the async one.
#[zbus::proxy(
    interface = "io.rollcall.Attendance1",
    default_service = "io.rollcall.Attendance1",
    default_path = "/io/rollcall/Attendance1"
)]
trait Attendance {
    async fn enroll(&self, identity_id: &str, name: &str, frames_json: &str) -> zbus::Result<String>;
    async fn recognize(
        &self,
        probe_json: &str,
        session_id: &str,
        expected_identity: &str,
    ) -> zbus::Result<String>;
    async fn start_session(
        &self,
        session_id: &str,
        course_id: &str,
        department: &str,
        year: &str,
    ) -> zbus::Result<bool>;
    async fn close_session(&self, session_id: &str) -> zbus::Result<bool>;
    async fn commit_attendance(
        &self,
        identity_id: &str,
        confidence: f64,
        session_id: &str,
    ) -> zbus::Result<String>;
    async fn list_identities(&self) -> zbus::Result<String>;
    async fn remove_identity(&self, identity_id: &str) -> zbus::Result<bool>;
    async fn settings(&self) -> zbus::Result<String>;
    async fn update_settings(&self, threshold: f64, presence_frames: u32) -> zbus::Result<String>;
    async fn status(&self) -> zbus::Result<String>;
    async fn test_ledger(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall face-recognition attendance CLI")]
struct Cli {
    /// Talk to a daemon on the session bus instead of the system bus
    #[arg(long, global = true)]
    session_bus: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll an identity from detection files (one frame per file)
    Enroll {
        /// Canonical identity id (e.g. student register number)
        identity_id: String,
        /// Display name
        #[arg(short, long, default_value = "")]
        name: String,
        /// Secondary id resolving to this identity (repeatable)
        #[arg(short, long = "alias")]
        aliases: Vec<String>,
        /// Detection score assigned to image files
        #[arg(long, default_value_t = 1.0)]
        score: f32,
        /// JSON detection lists or grayscale-convertible face images
        #[arg(required = true)]
        frames: Vec<PathBuf>,
    },
    /// Recognize the faces in one frame
    Recognize {
        /// JSON detection list or face image
        probe: PathBuf,
        /// Session to credit attendance to
        #[arg(short, long)]
        session: Option<String>,
        /// Identity the crop fallback should verify against
        #[arg(short, long)]
        expect: Option<String>,
        /// Detection score assigned to an image file
        #[arg(long, default_value_t = 1.0)]
        score: f32,
    },
    /// Manage recognition sessions
    #[command(subcommand)]
    Session(SessionCommand),
    /// Commit attendance for an identity without recognition
    Commit {
        identity_id: String,
        #[arg(short, long, default_value_t = 1.0)]
        confidence: f64,
        #[arg(short, long)]
        session: Option<String>,
    },
    /// List enrolled identities
    List,
    /// Remove an enrolled identity
    Remove {
        /// Identity id or alias
        id: String,
    },
    /// Show or change recognition settings
    Settings {
        /// Cosine similarity threshold in [0, 1]
        #[arg(long)]
        threshold: Option<f64>,
        /// Matched frames required before attendance counts
        #[arg(long)]
        presence_frames: Option<u32>,
    },
    /// Show daemon status
    Status,
    /// Check that the attendance ledger is reachable
    TestLedger,
}

#[derive(Subcommand)]
enum SessionCommand {
    /// Start a session (a random id is generated when none is given)
    Start {
        #[arg(long)]
        id: Option<String>,
        #[arg(long, default_value = "")]
        course: String,
        #[arg(long, default_value = "")]
        department: String,
        #[arg(long, default_value = "")]
        year: String,
    },
    /// Close a session
    Close { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let conn = if cli.session_bus {
        zbus::Connection::session().await
    } else {
        zbus::Connection::system().await
    }
    .context("connecting to D-Bus")?;
    let proxy = AttendanceProxy::new(&conn)
        .await
        .context("rollcalld is not reachable")?;

    match cli.command {
        Commands::Enroll {
            identity_id,
            name,
            aliases,
            score,
            frames,
        } => {
            let frames = frames
                .iter()
                .map(|p| load_frame(p, score))
                .collect::<Result<Vec<_>>>()?;
            tracing::debug!(identity = %identity_id, frames = frames.len(), "sending enrollment");
            let payload = serde_json::json!({ "frames": frames, "aliases": aliases });
            let reply = proxy.enroll(&identity_id, &name, &payload.to_string()).await?;
            print_json(&reply)?;
        }
        Commands::Recognize {
            probe,
            session,
            expect,
            score,
        } => {
            let probe = load_frame(&probe, score)?;
            let reply = proxy
                .recognize(
                    &serde_json::to_string(&probe)?,
                    session.as_deref().unwrap_or(""),
                    expect.as_deref().unwrap_or(""),
                )
                .await?;
            print_json(&reply)?;
        }
        Commands::Session(SessionCommand::Start {
            id,
            course,
            department,
            year,
        }) => {
            let id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            if proxy.start_session(&id, &course, &department, &year).await? {
                println!("{id}");
            } else {
                bail!("session {id} already exists");
            }
        }
        Commands::Session(SessionCommand::Close { id }) => {
            if proxy.close_session(&id).await? {
                println!("Closed session {id}");
            } else {
                println!("Session {id} was not active");
            }
        }
        Commands::Commit {
            identity_id,
            confidence,
            session,
        } => {
            let reply = proxy
                .commit_attendance(&identity_id, confidence, session.as_deref().unwrap_or(""))
                .await?;
            print_json(&reply)?;
            let value: serde_json::Value = serde_json::from_str(&reply)?;
            if value["outcome"] == "failed" {
                bail!("attendance not committed");
            }
        }
        Commands::List => print_json(&proxy.list_identities().await?)?,
        Commands::Remove { id } => {
            if proxy.remove_identity(&id).await? {
                println!("Removed {id}");
            } else {
                println!("No identity {id}");
            }
        }
        Commands::Settings {
            threshold,
            presence_frames,
        } => {
            if threshold.is_none() && presence_frames.is_none() {
                print_json(&proxy.settings().await?)?;
            } else {
                let current: serde_json::Value = serde_json::from_str(&proxy.settings().await?)?;
                let threshold = match threshold {
                    Some(t) => t,
                    None => current["similarity_threshold"]
                        .as_f64()
                        .context("daemon settings lack similarity_threshold")?,
                };
                let frames = match presence_frames {
                    Some(k) => k,
                    None => current["presence_frames"]
                        .as_u64()
                        .and_then(|k| u32::try_from(k).ok())
                        .context("daemon settings lack presence_frames")?,
                };
                print_json(&proxy.update_settings(threshold, frames).await?)?;
            }
        }
        Commands::Status => print_json(&proxy.status().await?)?,
        Commands::TestLedger => {
            let reply = proxy.test_ledger().await?;
            let value: serde_json::Value = serde_json::from_str(&reply)?;
            println!("{}", serde_json::to_string_pretty(&value)?);
            if value["ok"] != serde_json::Value::Bool(true) {
                bail!("ledger is not reachable");
            }
        }
    }

    Ok(())
}

/// One frame's detections: a JSON detection list, or an image treated as a single face crop.
fn load_frame(path: &Path, score: f32) -> Result<Vec<Detection>> {
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        return serde_json::from_str(&raw)
            .with_context(|| format!("{} is not a detection list", path.display()));
    }

    let img = image::open(path)
        .with_context(|| format!("decoding image {}", path.display()))?
        .to_luma8();
    let (width, height) = img.dimensions();
    Ok(vec![Detection {
        bbox: BoundingBox {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
        },
        face: FaceData::Crop(FaceCrop::from_image(&img)),
        detection_score: score,
    }])
}

fn print_json(reply: &str) -> Result<()> {
    let value: serde_json::Value = serde_json::from_str(reply).context("daemon sent invalid JSON")?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_json_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.json");
        std::fs::write(
            &path,
            r#"[{"bbox":{"x":1,"y":2,"width":30,"height":40},"face":{"embedding":[0.6,0.8]},"detection_score":0.93}]"#,
        )
        .unwrap();

        let frame = load_frame(&path, 1.0).unwrap();
        assert_eq!(frame.len(), 1);
        assert_eq!(frame[0].detection_score, 0.93);
        assert_eq!(frame[0].embedding().unwrap().dim(), 2);
    }

    #[test]
    fn test_load_image_frame_as_crop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("face.png");
        image::GrayImage::from_fn(12, 10, |x, y| image::Luma([(x * 10 + y) as u8]))
            .save(&path)
            .unwrap();

        let frame = load_frame(&path, 0.8).unwrap();
        let crop = frame[0].crop().unwrap();
        assert_eq!((crop.width, crop.height), (12, 10));
        assert_eq!(crop.pixels[0], 0);
        assert_eq!(frame[0].bbox.area(), 120.0);
        assert_eq!(frame[0].detection_score, 0.8);
    }

    #[test]
    fn test_cli_parses_session_start() {
        let cli = Cli::try_parse_from([
            "rollcall", "session", "start", "--course", "21CS701", "--year", "4th Year",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Session(SessionCommand::Start { id: None, .. })
        ));
    }

    #[test]
    fn test_enroll_requires_frames() {
        assert!(Cli::try_parse_from(["rollcall", "enroll", "S1"]).is_err());
    }
}
