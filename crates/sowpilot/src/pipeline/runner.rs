use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};
use tokio::task::{JoinError, JoinHandle};
use tracing::{info_span, Instrument};

use crate::cache::{CacheEntry, CacheLookup, DecisionCache, Fingerprint, SqliteCacheStore};
use crate::collaborators::{
    AmadeusHotelSearch, CollaboratorError, DocumentProvider, ExtractionOracle,
    FilesystemDocumentProvider, Geocoder, HotelSearchProvider, LogNotifier, NominatimGeocoder,
    Notification, Notifier, OfferQuery, OpenAiExtractionOracle, WebhookNotifier,
};
use crate::config::Config;
use crate::db::Database;
use crate::error::{ConfigError, SowpilotError};
use crate::hotels::{min_rooms, HotelDirectory, HotelMatchResult, JsonHotelDirectory, MatchingEngine};
use crate::job::{AnalysisJob, AnalysisType, JobOptions, JobStatus};
use crate::normalize::{normalize_offer, normalize_requirements, Requirements};
use crate::ratelimit::{with_retry, with_timeout};
use crate::secrets::{resolve_secret, resolve_secret_optional, SecretError};
use crate::store::{
    JobLogger, LogBroadcaster, LogSink, ResultStore, SqliteLogSink, SqliteResultStore,
};

use super::artifacts::{render_report, ArtifactWriter};
use super::context::{EventProfile, RunContext};
use super::dispatch::{notification_channel, NotificationDispatcher, NotificationQueue};
use super::error::PipelineError;
use super::phase::{Phase, JOB_STEP};

const NOTIFICATION_QUEUE_CAPACITY: usize = 64;

/// Highest adult count the offer search accepts per room.
const MAX_ADULTS_PER_QUERY: u32 = 9;

const EXTRACTION_INSTRUCTIONS: &str = "Extract the event requirements from the statement of \
work below. Respond with a single JSON object with the keys: location (city and state of the \
event venue, e.g. \"Denver, CO\"), check_in and check_out (ISO dates, YYYY-MM-DD), headcount \
(number of attendees needing lodging) and summary (one sentence). Use null for anything the \
documents do not state.";

/// External capabilities the orchestrator calls out to.
#[derive(Clone)]
pub struct Collaborators {
    pub documents: Arc<dyn DocumentProvider>,
    pub oracle: Arc<dyn ExtractionOracle>,
    pub geocoder: Arc<dyn Geocoder>,
    pub directory: Arc<dyn HotelDirectory>,
    /// Offer pricing is skipped without a search provider.
    pub hotel_search: Option<Arc<dyn HotelSearchProvider>>,
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Budget for a single collaborator call, and for hotel ranking as a
    /// whole.
    pub phase_timeout: Duration,
    pub retry_backoff: Duration,
    pub default_limit: usize,
    pub cache_enabled: bool,
    /// Artifacts are not written when unset.
    pub artifact_dir: Option<PathBuf>,
    pub default_recipients: Vec<String>,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            phase_timeout: Duration::from_secs(120),
            retry_backoff: Duration::from_secs(2),
            default_limit: 10,
            cache_enabled: true,
            artifact_dir: None,
            default_recipients: Vec::new(),
        }
    }
}

impl OrchestratorSettings {
    pub fn from_config(config: &Config) -> Self {
        let artifact_dir = config.artifact_directory.trim();
        Self {
            phase_timeout: config.pipeline.phase_timeout(),
            retry_backoff: config.pipeline.retry_backoff(),
            default_limit: config.pipeline.default_limit,
            cache_enabled: config.pipeline.cache_enabled,
            artifact_dir: (!artifact_dir.is_empty()).then(|| PathBuf::from(artifact_dir)),
            default_recipients: config.notifications.recipients.clone(),
        }
    }
}

/// A job that has been accepted and is running in the background.
#[derive(Debug)]
pub struct JobHandle {
    pub job_id: String,
    /// Status at the time the handle was returned.
    pub status: JobStatus,
    task: JoinHandle<AnalysisJob>,
}

impl JobHandle {
    /// Waits for the job to reach a terminal status.
    pub async fn wait(self) -> Result<AnalysisJob, JoinError> {
        self.task.await
    }
}

/// What a successful run hands to the persist phase.
struct Outcome {
    payload: Value,
    cache_write: Option<CacheWrite>,
}

struct CacheWrite {
    context: Value,
    hotels: Vec<HotelMatchResult>,
}

impl Outcome {
    fn payload(payload: Value) -> Self {
        Self {
            payload,
            cache_write: None,
        }
    }
}

/// Drives analysis jobs through their phases and records every outcome.
pub struct Orchestrator {
    store: Arc<dyn ResultStore>,
    logs: Arc<dyn LogSink>,
    cache: DecisionCache,
    collaborators: Collaborators,
    engine: MatchingEngine,
    settings: OrchestratorSettings,
    artifacts: Option<ArtifactWriter>,
    notifications: Option<NotificationQueue>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn ResultStore>,
        logs: Arc<dyn LogSink>,
        cache: DecisionCache,
        collaborators: Collaborators,
        settings: OrchestratorSettings,
    ) -> Self {
        let engine = MatchingEngine::new(
            collaborators.geocoder.clone(),
            collaborators.directory.clone(),
        )
        .with_timeouts(settings.phase_timeout, settings.retry_backoff)
        .with_ranking_budget(settings.phase_timeout);
        let artifacts = settings
            .artifact_dir
            .as_ref()
            .map(|dir| ArtifactWriter::new(dir.clone()));

        Self {
            store,
            logs,
            cache,
            collaborators,
            engine,
            settings,
            artifacts,
            notifications: None,
        }
    }

    pub fn with_notifications(mut self, queue: NotificationQueue) -> Self {
        self.notifications = Some(queue);
        self
    }

    /// Production constructor: opens every collaborator named in `config`
    /// on top of `db`. The returned dispatcher must be spawned for reports
    /// to be delivered.
    pub fn from_config(
        config: &Config,
        db: Database,
        broadcaster: Option<LogBroadcaster>,
    ) -> Result<(Self, NotificationDispatcher), SowpilotError> {
        let oracle_key = match resolve_secret_optional(
            config.oracle.api_key.as_deref(),
            config.oracle.api_key_file.as_deref(),
            config.oracle.api_key_env_var.as_deref(),
        ) {
            Ok(key) => key,
            Err(SecretError::EnvVarNotSet { name }) => {
                tracing::warn!("Environment variable {} not set", name);
                None
            }
            Err(e) => {
                return Err(ConfigError::Secret {
                    name: "oracle.api_key",
                    source: e,
                }
                .into())
            }
        };
        if oracle_key.is_none() {
            tracing::warn!("No oracle API key configured; extraction requests are unauthenticated");
        }

        let hotel_search: Option<Arc<dyn HotelSearchProvider>> = if config.hotel_search.enabled {
            let search = &config.hotel_search;
            let client_id = resolve_secret(
                search.client_id.as_deref(),
                search.client_id_file.as_deref(),
                search.client_id_env_var.as_deref(),
            )
            .map_err(|e| ConfigError::Secret {
                name: "hotel_search.client_id",
                source: e,
            })?;
            let client_secret = resolve_secret(
                search.client_secret.as_deref(),
                search.client_secret_file.as_deref(),
                search.client_secret_env_var.as_deref(),
            )
            .map_err(|e| ConfigError::Secret {
                name: "hotel_search.client_secret",
                source: e,
            })?;
            Some(Arc::new(AmadeusHotelSearch::new(
                &search.base_url,
                client_id,
                client_secret,
            )?))
        } else {
            None
        };

        let collaborators = Collaborators {
            documents: Arc::new(FilesystemDocumentProvider::new(&config.document_root)),
            oracle: Arc::new(OpenAiExtractionOracle::new(&config.oracle, oracle_key)?),
            geocoder: Arc::new(NominatimGeocoder::new(&config.geocoding)?),
            directory: Arc::new(JsonHotelDirectory::load(Path::new(&config.hotel_directory))?),
            hotel_search,
        };

        let notifier: Arc<dyn Notifier> = match config.notifications.webhook_url.as_deref() {
            Some(url) if !url.trim().is_empty() => Arc::new(WebhookNotifier::new(url)?),
            _ => Arc::new(LogNotifier),
        };

        let mut log_sink = SqliteLogSink::new(db.clone());
        if let Some(broadcaster) = broadcaster {
            log_sink = log_sink.with_broadcaster(broadcaster);
        }
        let logs: Arc<dyn LogSink> = Arc::new(log_sink);
        let (queue, dispatcher) =
            notification_channel(NOTIFICATION_QUEUE_CAPACITY, notifier, logs.clone());

        let orchestrator = Self::new(
            Arc::new(SqliteResultStore::new(db.clone())),
            logs,
            DecisionCache::new(Arc::new(SqliteCacheStore::new(db))),
            collaborators,
            OrchestratorSettings::from_config(config),
        )
        .with_notifications(queue);

        Ok((orchestrator, dispatcher))
    }

    pub fn store(&self) -> &Arc<dyn ResultStore> {
        &self.store
    }

    pub fn logs(&self) -> &Arc<dyn LogSink> {
        &self.logs
    }

    pub fn cache(&self) -> &DecisionCache {
        &self.cache
    }

    /// Accepts a run and executes it on a background task.
    ///
    /// Validation failures are returned before any job record exists. Every
    /// accepted call gets its own job record, even while another run for the
    /// same opportunity is still in flight.
    pub fn run(
        self: &Arc<Self>,
        opportunity_ref: &str,
        analysis_type: &str,
        options: Value,
    ) -> Result<JobHandle, PipelineError> {
        let ctx = self.start(opportunity_ref, analysis_type, options)?;
        let job_id = ctx.job.id.clone();
        let status = ctx.job.status;
        let span = job_span(&ctx.job);

        let this = Arc::clone(self);
        let task = tokio::spawn(async move { this.execute(ctx).await }.instrument(span));

        Ok(JobHandle {
            job_id,
            status,
            task,
        })
    }

    /// Like [`Orchestrator::run`], but executes inline and returns the
    /// terminal job.
    pub async fn run_to_completion(
        &self,
        opportunity_ref: &str,
        analysis_type: &str,
        options: Value,
    ) -> Result<AnalysisJob, PipelineError> {
        let ctx = self.start(opportunity_ref, analysis_type, options)?;
        let span = job_span(&ctx.job);
        Ok(self.execute(ctx).instrument(span).await)
    }

    /// Validates the request, creates the pending record and moves it to
    /// running.
    fn start(
        &self,
        opportunity_ref: &str,
        analysis_type: &str,
        raw_options: Value,
    ) -> Result<RunContext, PipelineError> {
        let opportunity_ref = opportunity_ref.trim();
        if opportunity_ref.is_empty() {
            return Err(PipelineError::Configuration(
                "opportunityRef must not be empty".to_string(),
            ));
        }
        let analysis_type: AnalysisType = analysis_type.parse()?;
        let options = JobOptions::from_value(&raw_options)?;

        let mut job = AnalysisJob::new(opportunity_ref, analysis_type, raw_options);
        self.store.create(&job)?;
        let log = JobLogger::new(self.logs.clone(), &job.id);
        log.info(
            JOB_STEP,
            format!("Job created for {} ({})", job.opportunity_ref, analysis_type),
        );

        job.transition_to(JobStatus::Running)
            .map_err(|e| PipelineError::Configuration(e.to_string()))?;
        self.store.save(&job)?;
        log.info(JOB_STEP, "Job running");

        Ok(RunContext::new(job, options, log))
    }

    async fn execute(&self, mut ctx: RunContext) -> AnalysisJob {
        let outcome = match ctx.job.analysis_type {
            AnalysisType::SowExtraction => self.run_sow_extraction(&mut ctx).await,
            AnalysisType::HotelMatch => self.run_hotel_match(&mut ctx).await,
        };

        match outcome {
            Ok(outcome) => {
                self.persist(&mut ctx, outcome)
                    .instrument(info_span!("persist"))
                    .await
            }
            Err(e) => self.fail(&mut ctx, e),
        }

        self.notify(&ctx);
        ctx.job
    }

    /// One collaborator call under the phase timeout, retried once when the
    /// failure is transient.
    async fn call<T, F, Fut>(&self, service: &'static str, mut op: F) -> Result<T, CollaboratorError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CollaboratorError>>,
    {
        let budget = self.settings.phase_timeout;
        with_retry(self.settings.retry_backoff, || {
            with_timeout(service, budget, op())
        })
        .await
    }

    // ─── sow_extraction ─────────────────────────────────────────────────────

    async fn run_sow_extraction(&self, ctx: &mut RunContext) -> Result<Outcome, PipelineError> {
        self.collect_documents(ctx)
            .instrument(info_span!("document_collection"))
            .await?;
        if ctx.document_text.trim().is_empty() {
            return Err(PipelineError::NoDocuments(ctx.job.opportunity_ref.clone()));
        }
        self.extract(ctx).instrument(info_span!("extraction")).await?;
        Ok(Outcome::payload(extraction_payload(ctx)))
    }

    async fn collect_documents(&self, ctx: &mut RunContext) -> Result<(), PipelineError> {
        let step = Phase::DocumentCollection.as_str();
        ctx.log.info(step, "Collecting documents");

        let opportunity_ref = ctx.job.opportunity_ref.clone();
        let documents = self
            .call("document provider", || {
                self.collaborators.documents.documents(&opportunity_ref)
            })
            .await
            .map_err(|e| PipelineError::unavailable(Phase::DocumentCollection, e))?;

        let mut text = String::new();
        for doc in &documents {
            ctx.document_names.push(doc.name.clone());
            match doc.text() {
                Some(content) if !content.trim().is_empty() => {
                    text.push_str(&format!("--- {} ---\n", doc.name));
                    text.push_str(content.trim());
                    text.push_str("\n\n");
                }
                Some(_) => ctx.log.info(step, format!("Document {} is empty", doc.name)),
                None => ctx.log.info(
                    step,
                    format!("Skipping {} ({}): not a text format", doc.name, doc.mime_type),
                ),
            }
        }
        ctx.document_text = text;

        ctx.log.info(
            step,
            format!(
                "Collected {} document(s), {} characters of text",
                documents.len(),
                ctx.document_text.chars().count()
            ),
        );
        Ok(())
    }

    /// Oracle failures are returned; malformed oracle output never is.
    async fn extract(&self, ctx: &mut RunContext) -> Result<(), PipelineError> {
        let step = Phase::Extraction.as_str();
        ctx.log.info(step, "Requesting structured extraction");

        let text = ctx.document_text.clone();
        let raw = self
            .call("extraction oracle", || {
                self.collaborators.oracle.extract(&text, EXTRACTION_INSTRUCTIONS)
            })
            .await
            .map_err(|e| PipelineError::unavailable(Phase::Extraction, e))?;

        let normalized = normalize_requirements(&raw);
        if !raw.is_object() {
            let malformed = PipelineError::MalformedUpstreamData {
                phase: Phase::Extraction,
                detail: "oracle output is not a JSON object".to_string(),
            };
            ctx.degrade(step, malformed.to_string());
        } else if normalized.fallback_used {
            let malformed = PipelineError::MalformedUpstreamData {
                phase: Phase::Extraction,
                detail: "no usable event location in oracle output".to_string(),
            };
            ctx.degrade(step, malformed.to_string());
        }

        let missing = normalized
            .missing
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>();
        ctx.log.info(
            step,
            format!(
                "Requirements decoded ({}){}",
                if normalized.strict { "strict" } else { "normalized" },
                if missing.is_empty() {
                    String::new()
                } else {
                    format!("; missing: {}", missing.join(", "))
                }
            ),
        );
        ctx.extraction = Some(normalized);
        Ok(())
    }

    // ─── hotel_match ────────────────────────────────────────────────────────

    async fn run_hotel_match(&self, ctx: &mut RunContext) -> Result<Outcome, PipelineError> {
        let early = self.known_profile(ctx);
        let mut consulted_key = None;
        if let Some(profile) = &early {
            let lookup = self.cache_lookup(ctx, profile);
            consulted_key = ctx.cache_key.clone();
            if let Some(entry) = lookup {
                return Ok(Outcome::payload(cached_payload(ctx, profile, entry)));
            }
        }

        self.collect_documents(ctx)
            .instrument(info_span!("document_collection"))
            .await?;
        if ctx.document_text.trim().is_empty() {
            if early.is_none() {
                return Err(PipelineError::NoDocuments(ctx.job.opportunity_ref.clone()));
            }
            ctx.degrade(
                Phase::DocumentCollection.as_str(),
                "No document text; continuing with the known event profile",
            );
        } else {
            match self.extract(ctx).instrument(info_span!("extraction")).await {
                Ok(()) => {}
                Err(e) if early.is_some() => ctx.degrade(
                    Phase::Extraction.as_str(),
                    format!("{}; continuing with the known event profile", e),
                ),
                Err(e) => return Err(e),
            }
        }

        let mut profile = ctx.profile();
        if let Some(known) = &early {
            profile = profile.fill_from(known);
        }
        let Some(context) = profile.cache_context() else {
            ctx.degrade(
                Phase::HotelSearch.as_str(),
                "No event location available; hotel search skipped",
            );
            return Ok(Outcome::payload(hotel_payload(ctx, &profile, &[])));
        };

        if consulted_key.as_deref() == Some(Fingerprint::of(&context).key_hash.as_str()) {
            ctx.log.info(
                Phase::CacheLookup.as_str(),
                "Event profile unchanged since the first lookup",
            );
        } else if let Some(entry) = self.cache_lookup(ctx, &profile) {
            return Ok(Outcome::payload(cached_payload(ctx, &profile, entry)));
        }

        let hotels = self
            .search_hotels(ctx, &profile)
            .instrument(info_span!("hotel_search"))
            .await;

        let cache_write = (self.settings.cache_enabled && !ctx.fallback_used && !hotels.is_empty())
            .then(|| CacheWrite {
                context,
                hotels: hotels.clone(),
            });
        Ok(Outcome {
            payload: hotel_payload(ctx, &profile, &hotels),
            cache_write,
        })
    }

    /// The event profile before any document is read: job overrides on top
    /// of the latest completed extraction for the same opportunity.
    fn known_profile(&self, ctx: &RunContext) -> Option<EventProfile> {
        let previous = match self
            .store
            .latest_completed(&ctx.job.opportunity_ref, AnalysisType::SowExtraction)
        {
            Ok(job) => job.and_then(|job| {
                let requirements = job
                    .result_payload
                    .as_ref()
                    .and_then(|p| p.get("requirements"))
                    .and_then(|r| serde_json::from_value::<Requirements>(r.clone()).ok())?;
                ctx.log.info(
                    Phase::CacheLookup.as_str(),
                    format!("Using requirements from extraction job {}", job.id),
                );
                Some(requirements)
            }),
            Err(e) => {
                ctx.log.warn(
                    Phase::CacheLookup.as_str(),
                    format!("Could not read earlier extractions: {}", e),
                );
                None
            }
        };

        let profile =
            EventProfile::from_requirements(&previous.unwrap_or_default(), &ctx.options);
        profile.is_known().then_some(profile)
    }

    fn cache_lookup(&self, ctx: &mut RunContext, profile: &EventProfile) -> Option<CacheEntry> {
        let step = Phase::CacheLookup.as_str();
        let context = profile.cache_context()?;

        if !self.settings.cache_enabled {
            ctx.log.info(step, "Decision cache disabled");
            return None;
        }
        if ctx.options.force_refresh {
            ctx.cache_key = Some(Fingerprint::of(&context).key_hash);
            ctx.cache_bypassed = true;
            ctx.log.info(step, "force_refresh set; decision cache bypassed");
            return None;
        }

        match self.cache.lookup_detailed(&context) {
            CacheLookup::Hit(entry) => {
                ctx.log.info(
                    step,
                    format!(
                        "Cache hit {} ({} hotel(s))",
                        entry.key_hash,
                        entry.recommended_hotels.len()
                    ),
                );
                ctx.cache_key = Some(entry.key_hash.clone());
                ctx.cache_hit = true;
                Some(entry)
            }
            CacheLookup::Miss { key_hash } => {
                ctx.log.info(step, format!("Cache miss {}", key_hash));
                ctx.cache_key = Some(key_hash);
                None
            }
            CacheLookup::Unavailable { key_hash, error } => {
                let err = PipelineError::CacheUnavailable(error.to_string());
                ctx.log.warn(step, format!("{}; treating as a miss", err));
                ctx.cache_key = Some(key_hash);
                None
            }
        }
    }

    /// Never fails: every problem here degrades to fewer or unpriced hotels.
    async fn search_hotels(
        &self,
        ctx: &mut RunContext,
        profile: &EventProfile,
    ) -> Vec<HotelMatchResult> {
        let step = Phase::HotelSearch.as_str();
        let location = profile.location.clone().unwrap_or_default();
        let limit = ctx.options.limit.unwrap_or(self.settings.default_limit);
        ctx.log.info(
            step,
            format!(
                "Ranking hotels near '{}' (min rooms {}, limit {})",
                location,
                min_rooms(profile.headcount),
                limit
            ),
        );

        let mut hotels = match self
            .engine
            .recommend(&location, profile.headcount, limit)
            .await
        {
            Ok(recommendation) => {
                if recommendation.timed_out {
                    ctx.degrade(
                        step,
                        format!(
                            "Hotel ranking exceeded its {}s budget; ranked by rating and room count",
                            self.settings.phase_timeout.as_secs()
                        ),
                    );
                } else if recommendation.fallback_used {
                    ctx.degrade(
                        step,
                        format!(
                            "Event location '{}' could not be geocoded; ranked by rating and room count",
                            location
                        ),
                    );
                }
                if recommendation.hotels.is_empty() {
                    ctx.degrade(
                        step,
                        format!(
                            "No hotels with at least {} rooms near '{}'",
                            recommendation.min_rooms, location
                        ),
                    );
                } else {
                    ctx.log.info(
                        step,
                        format!("Ranked {} hotel(s)", recommendation.hotels.len()),
                    );
                }
                recommendation.hotels
            }
            Err(e) => {
                let err = PipelineError::unavailable(Phase::HotelSearch, e);
                ctx.degrade(step, format!("{}; no hotels ranked", err));
                Vec::new()
            }
        };

        self.price_hotels(ctx, profile, &mut hotels).await;
        hotels
    }

    /// Fills prices from the offer search when dates and a city code are known.
    async fn price_hotels(
        &self,
        ctx: &mut RunContext,
        profile: &EventProfile,
        hotels: &mut [HotelMatchResult],
    ) {
        let step = Phase::HotelSearch.as_str();
        if hotels.is_empty() {
            return;
        }
        let Some(provider) = self.collaborators.hotel_search.clone() else {
            ctx.log.info(step, "Hotel search provider not configured; prices omitted");
            return;
        };
        let city_code = ctx
            .options
            .city_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());
        let (Some(check_in), Some(check_out), Some(city_code)) =
            (profile.check_in, profile.check_out, city_code)
        else {
            ctx.log.info(
                step,
                "Pricing skipped: needs check-in, check-out and a city code",
            );
            return;
        };

        let query = OfferQuery {
            city_code: city_code.to_uppercase(),
            check_in,
            check_out,
            adults: profile
                .headcount
                .map(|h| h.clamp(1, MAX_ADULTS_PER_QUERY))
                .unwrap_or(1),
        };
        let offers = match self
            .call("hotel search", || provider.search_offers(&query))
            .await
        {
            Ok(offers) => offers,
            Err(e) => {
                let err = PipelineError::unavailable(Phase::HotelSearch, e);
                ctx.degrade(step, format!("{}; prices omitted", err));
                return;
            }
        };

        let mut prices: HashMap<String, (f64, Option<String>)> = HashMap::new();
        let mut unnamed = 0usize;
        for raw in &offers {
            let offer = normalize_offer(raw);
            if offer.fallback_used {
                unnamed += 1;
                continue;
            }
            if let Some(total) = offer.price_total {
                prices
                    .entry(name_key(&offer.hotel_name))
                    .or_insert((total, offer.price_currency));
            }
        }

        let mut priced = 0usize;
        for result in hotels.iter_mut() {
            if let Some((total, currency)) = prices.get(&name_key(&result.hotel.name)) {
                result.price_total = Some(*total);
                result.price_currency = currency.clone();
                priced += 1;
            }
        }

        if unnamed > 0 {
            ctx.degrade(
                step,
                format!("{} offer(s) without a usable hotel name were ignored", unnamed),
            );
        }
        ctx.log.info(
            step,
            format!(
                "Priced {} of {} hotel(s) from {} offer(s)",
                priced,
                hotels.len(),
                offers.len()
            ),
        );
    }

    // ─── persist / fail / notify ────────────────────────────────────────────

    async fn persist(&self, ctx: &mut RunContext, outcome: Outcome) {
        let step = Phase::Persist.as_str();
        ctx.log.info(step, "Persisting result");
        let running = ctx.job.clone();

        ctx.job.result_payload = Some(outcome.payload);
        if let Err(e) = ctx.job.transition_to(JobStatus::Completed) {
            ctx.log.error(step, e.to_string());
            return;
        }

        if let Some(writer) = &self.artifacts {
            let payload = ctx.job.result_payload.clone().unwrap_or(Value::Null);
            match writer.write(&ctx.job, &payload).await {
                Ok(paths) => {
                    ctx.log.info(step, format!("Wrote {} artifact(s)", paths.len()));
                    ctx.job.artifact_paths = paths;
                }
                Err(e) => ctx.log.warn(step, format!("Artifact write failed: {}", e)),
            }
        }

        if let Some(write) = outcome.cache_write {
            let extra = json!({
                "jobId": ctx.job.id,
                "opportunityRef": ctx.job.opportunity_ref,
            });
            match self.cache.try_save(&write.context, &write.hotels, None, extra) {
                Ok(entry) => ctx
                    .log
                    .info(step, format!("Saved decision cache entry {}", entry.key_hash)),
                Err(e) => ctx.log.warn(step, format!("Decision cache save failed: {}", e)),
            }
        }

        match self.store.save(&ctx.job) {
            Ok(()) => ctx.log.info(JOB_STEP, "Job completed"),
            Err(e) => {
                ctx.job = running;
                self.fail(ctx, PipelineError::Storage(e));
            }
        }
    }

    fn fail(&self, ctx: &mut RunContext, error: PipelineError) {
        let step = error.phase().map(|p| p.as_str()).unwrap_or(JOB_STEP);
        ctx.log.error(step, error.to_string());

        let mut payload = partial_payload(ctx);
        payload.insert(
            "error".to_string(),
            json!({
                "reason": error.reason(),
                "message": error.to_string(),
                "phase": error.phase(),
            }),
        );
        ctx.job.result_payload = Some(Value::Object(payload));
        if let Err(e) = ctx.job.transition_to(JobStatus::Failed) {
            ctx.log.error(JOB_STEP, e.to_string());
            return;
        }

        match self.store.save(&ctx.job) {
            Ok(()) => ctx.log.info(JOB_STEP, format!("Job failed: {}", error.reason())),
            Err(e) => ctx
                .log
                .error(JOB_STEP, format!("Failed to record job failure: {}", e)),
        }
    }

    /// Queues the report; delivery happens on the dispatcher task.
    fn notify(&self, ctx: &RunContext) {
        let step = Phase::Notify.as_str();
        let Some(queue) = &self.notifications else {
            ctx.log.info(step, "No notifier configured");
            return;
        };

        let mut recipients = self.settings.default_recipients.clone();
        for recipient in &ctx.options.recipients {
            if !recipients.contains(recipient) {
                recipients.push(recipient.clone());
            }
        }

        let job = &ctx.job;
        let payload = job.result_payload.clone().unwrap_or(Value::Null);
        let notification = Notification {
            job_id: job.id.clone(),
            opportunity_ref: job.opportunity_ref.clone(),
            analysis_type: job.analysis_type,
            status: job.status,
            recipients,
            subject: format!(
                "{} {} for {}",
                job.analysis_type, job.status, job.opportunity_ref
            ),
            report: render_report(job, &payload),
        };

        if queue.enqueue(notification) {
            ctx.log.info(step, "Report queued for delivery");
        } else {
            ctx.log.warn(step, "Report dropped: notification queue unavailable");
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

fn job_span(job: &AnalysisJob) -> tracing::Span {
    info_span!("job",
        job_id = %job.id,
        opportunity = %job.opportunity_ref,
        analysis_type = %job.analysis_type,
    )
}

/// Lowercase alphanumerics only, for matching offers to directory hotels.
fn name_key(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Whatever was captured before the run stopped.
fn partial_payload(ctx: &RunContext) -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert("analysisType".to_string(), json!(ctx.job.analysis_type));
    payload.insert("documents".to_string(), json!(ctx.document_names));
    if let Some(extraction) = &ctx.extraction {
        payload.insert("requirements".to_string(), json!(extraction.requirements));
        payload.insert("missingFields".to_string(), json!(extraction.missing));
    }
    payload.insert("fallback_used".to_string(), json!(ctx.fallback_used));
    payload.insert("degradations".to_string(), json!(ctx.degradations));
    payload
}

fn extraction_payload(ctx: &RunContext) -> Value {
    let mut payload = partial_payload(ctx);
    let strict = ctx.extraction.as_ref().is_some_and(|e| e.strict);
    payload.insert("strict".to_string(), json!(strict));
    Value::Object(payload)
}

fn cache_status(ctx: &RunContext) -> Value {
    json!({
        "hit": ctx.cache_hit,
        "keyHash": ctx.cache_key,
        "bypassed": ctx.cache_bypassed,
    })
}

fn hotel_payload(ctx: &RunContext, profile: &EventProfile, hotels: &[HotelMatchResult]) -> Value {
    let mut payload = partial_payload(ctx);
    payload.insert("event".to_string(), json!(profile));
    payload.insert("minRooms".to_string(), json!(min_rooms(profile.headcount)));
    payload.insert("hotels".to_string(), json!(hotels));
    payload.insert("cache".to_string(), cache_status(ctx));
    Value::Object(payload)
}

fn cached_payload(ctx: &RunContext, profile: &EventProfile, entry: CacheEntry) -> Value {
    let mut payload = partial_payload(ctx);
    payload.insert("event".to_string(), json!(profile));
    payload.insert("minRooms".to_string(), json!(min_rooms(profile.headcount)));
    payload.insert("hotels".to_string(), json!(entry.recommended_hotels));
    let mut cache = cache_status(ctx);
    cache["patternDescription"] = json!(entry.pattern_description);
    cache["cachedAt"] = json!(entry.created_at);
    payload.insert("cache".to_string(), cache);
    Value::Object(payload)
}
