use std::fmt::Display;

use crate::events::{EventSink, ProgressEvent};
use crate::extract::{
    Extracted, captcha_visible, extract_curriculum, extract_grade_report,
    extract_semester_routine, extract_student_home,
};
use crate::parser::ParseError;
use crate::report::{ReportParts, pack};
use crate::session::{HttpSession, PortalConfig, PortalResponse, PortalSession, SessionError};
use crate::types::{ClassRoutine, Report, SkippedRow};

const EVALUATION_PATH: &str = "Student/Tpe/Start";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthFailure {
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("Captcha required. Solve it from portal.")]
    CaptchaRequired,
    #[error("TPE Evaluation Pending")]
    EvaluationPending,
    #[error("Error in request")]
    Rejected { status: u16 },
}

#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("Username and password are required")]
    Credentials,
    #[error(transparent)]
    Auth(#[from] AuthFailure),
    #[error("Server error. Try again later")]
    Upstream { status: u16, url: String },
    #[error("Portal returned {status} for {url}")]
    PageUnavailable { status: u16, url: String },
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("Progress receiver disconnected")]
    Cancelled,
}

/// Where a scrape currently is. Every step moves forward; `Error` can follow
/// any state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    Init,
    Authenticating,
    Authenticated,
    FetchingCurriculum,
    FetchingGrades,
    FetchingSchedule(String),
    Assembling,
    Complete,
    Error,
}

impl Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Init => write!(f, "init"),
            Stage::Authenticating => write!(f, "authenticating"),
            Stage::Authenticated => write!(f, "authenticated"),
            Stage::FetchingCurriculum => write!(f, "fetching curriculum"),
            Stage::FetchingGrades => write!(f, "fetching grades"),
            Stage::FetchingSchedule(semester) => write!(f, "fetching schedule ({})", semester),
            Stage::Assembling => write!(f, "assembling"),
            Stage::Complete => write!(f, "complete"),
            Stage::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

struct Progress<'a, K> {
    sink: &'a mut K,
    stage: Stage,
}

impl<K: EventSink + Send> Progress<'_, K> {
    fn advance(&mut self, next: Stage) -> Result<(), ScrapeError> {
        log::debug!("Scrape stage: {} -> {}", self.stage, next);
        self.stage = next;
        if self.sink.is_closed() {
            log::info!("Progress receiver left during {}, stopping", self.stage);
            return Err(ScrapeError::Cancelled);
        }
        Ok(())
    }

    async fn say(&mut self, message: impl Into<String>) -> Result<(), ScrapeError> {
        let message = message.into();
        log::info!("{}", message);
        self.sink
            .emit(ProgressEvent::running(message))
            .await
            .map_err(|_| ScrapeError::Cancelled)
    }
}

/// Drives one report request against the portal: login, curriculum, grades,
/// each semester's registration page, then assembly.
#[derive(Debug, Clone)]
pub struct PortalScraper<S> {
    session: S,
    base_url: String,
}

impl PortalScraper<HttpSession> {
    pub fn new(config: &PortalConfig) -> Result<Self, ScrapeError> {
        Ok(Self::with_session(
            HttpSession::new(config)?,
            config.base_url.clone(),
        ))
    }
}

impl<S: PortalSession + Sync> PortalScraper<S> {
    pub fn with_session(session: S, base_url: impl Into<String>) -> Self {
        Self {
            session,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Runs the whole scrape, reporting to `sink`.
    ///
    /// Exactly one terminal event (`error` or `complete`) is emitted, unless
    /// the receiver went away, in which case `ScrapeError::Cancelled` is
    /// returned and nothing more is sent.
    pub async fn run<K: EventSink + Send>(
        &self,
        credentials: &Credentials,
        sink: &mut K,
    ) -> Result<Report, ScrapeError> {
        let mut progress = Progress {
            sink,
            stage: Stage::Init,
        };

        match self.scrape(credentials, &mut progress).await {
            Ok(report) => {
                progress
                    .sink
                    .emit(ProgressEvent::Complete {
                        result: Box::new(report.clone()),
                    })
                    .await
                    .map_err(|_| ScrapeError::Cancelled)?;
                Ok(report)
            }
            Err(ScrapeError::Cancelled) => Err(ScrapeError::Cancelled),
            Err(e) => {
                log::error!("Scrape failed while {}: {}", progress.stage, e);
                progress.stage = Stage::Error;
                let terminal = ProgressEvent::Error {
                    message: e.to_string(),
                };
                if progress.sink.emit(terminal).await.is_err() {
                    log::warn!("Could not deliver error event: receiver gone");
                }
                Err(e)
            }
        }
    }

    async fn scrape<K: EventSink + Send>(
        &self,
        credentials: &Credentials,
        progress: &mut Progress<'_, K>,
    ) -> Result<Report, ScrapeError> {
        progress.say("Processing request...").await?;

        if credentials.username.is_empty() || credentials.password.is_empty() {
            return Err(ScrapeError::Credentials);
        }

        progress.advance(Stage::Authenticating)?;
        let login = self.login(credentials).await?;

        progress.advance(Stage::Authenticated)?;
        progress.say("Logged in to portal").await?;
        if login.final_url.contains(EVALUATION_PATH) {
            return Err(AuthFailure::EvaluationPending.into());
        }

        let home = self.fetch_page(format!("{}/Student", self.base_url)).await?;
        log::debug!(
            "Session cookies: {:?}",
            self.session.cookies(&self.base_url).keys().collect::<Vec<_>>()
        );
        let home = extract_student_home(&home.body)?;
        let mut skipped: Vec<SkippedRow> = Vec::new();

        progress.advance(Stage::FetchingCurriculum)?;
        progress.say("Getting curriculum data...").await?;
        let index = self
            .fetch_page(format!("{}/Student/Curriculum", self.base_url))
            .await?;
        let Extracted {
            value: course_map,
            skipped: curriculum_skipped,
        } = extract_curriculum(&index.body, move |id| {
            self.fetch_body(format!("{}/Common/Curriculum?ID={}", self.base_url, id))
        })
        .await?;
        skipped.extend(curriculum_skipped);
        progress.say("Completed getting curriculum data").await?;

        progress.advance(Stage::FetchingGrades)?;
        progress.say("Getting completed courses...").await?;
        let grade_page = self
            .fetch_page(format!("{}/Student/GradeReport/ByCurriculum", self.base_url))
            .await?;
        let grades = extract_grade_report(&grade_page.body, &home.current_semester);
        skipped.extend(grades.skipped);
        progress.say("Completed getting completed courses").await?;

        progress.say("Fetching semester data...").await?;
        let mut routine = ClassRoutine::new();
        for semester in &home.semesters {
            progress.advance(Stage::FetchingSchedule(semester.label.clone()))?;
            progress.say(format!("Analyzing: {}", semester.label)).await?;

            let page = self
                .fetch_page(format!(
                    "{}/Student/Registration?q={}",
                    self.base_url, semester.token
                ))
                .await?;
            match extract_semester_routine(&page.body, &semester.label) {
                Ok(extracted) => {
                    skipped.extend(extracted.skipped);
                    routine.insert(semester.label.clone(), extracted.value);
                }
                Err(e) => {
                    log::warn!("Skipping semester {}: {}", semester.label, e);
                    skipped.push(SkippedRow {
                        page: format!("registration {}", semester.label),
                        detail: e.to_string(),
                    });
                }
            }
        }
        progress.say("Completed processing semesters").await?;

        progress.advance(Stage::Assembling)?;
        progress.say("Packing all data...").await?;
        let report = pack(ReportParts {
            grades: grades.value,
            routine,
            course_map,
            user: home.user,
            current_semester: home.current_semester,
            skipped,
        });

        progress.advance(Stage::Complete)?;
        Ok(report)
    }

    async fn login(&self, credentials: &Credentials) -> Result<PortalResponse, ScrapeError> {
        log::info!("Signing in as {}", credentials.username);
        let response = self
            .session
            .post_form(
                &self.base_url,
                &[
                    ("UserName", credentials.username.as_str()),
                    ("Password", credentials.password.as_str()),
                ],
            )
            .await?;

        if response.is_server_error() {
            return Err(ScrapeError::Upstream {
                status: response.status,
                url: response.final_url,
            });
        }
        if !response.is_success() {
            return Err(AuthFailure::Rejected {
                status: response.status,
            }
            .into());
        }

        if !response
            .final_url
            .contains(&format!("{}/Student", self.base_url))
        {
            log::info!("Login landed on {}", response.final_url);
            return Err(if captcha_visible(&response.body) {
                AuthFailure::CaptchaRequired
            } else {
                AuthFailure::InvalidCredentials
            }
            .into());
        }

        Ok(response)
    }

    async fn fetch_page(&self, url: String) -> Result<PortalResponse, ScrapeError> {
        log::info!("Fetching {}", url);
        let response = self.session.get(&url).await?;
        if response.is_server_error() {
            return Err(ScrapeError::Upstream {
                status: response.status,
                url,
            });
        }
        if !response.is_success() {
            return Err(ScrapeError::PageUnavailable {
                status: response.status,
                url,
            });
        }
        Ok(response)
    }

    async fn fetch_body(&self, url: String) -> Result<String, ScrapeError> {
        Ok(self.fetch_page(url).await?.body)
    }
}
