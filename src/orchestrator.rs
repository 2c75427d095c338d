//! Run orchestration
//!
//! One run loads the index, processes the selected sources in the fixed
//! order `noaa, ims, uwyo`, writes every fetched record as an artifact,
//! folds its valid time into the index and finally rebuilds the daily
//! digests and persists the index. The first failing source aborts the run before
//! anything is persisted.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, instrument};

use crate::config::AirsoundsConfig;
use crate::digest;
use crate::error::AirsoundsError;
use crate::index::Index;
use crate::models::{Location, SourceKind, SourceSelection};
use crate::providers::{
    FetchContext, ImsClient, ImsPipeline, NoaaClient, NoaaPipeline, SourcePipeline, StampPolicy, UwyoClient,
    UwyoPipeline, http_client,
};
use crate::storage::{ArtifactWriter, PathResolver};

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen at a given instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Outcome of a successful run
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Written paths in write order: artifacts, digests, then the index
    pub modified: Vec<PathBuf>,
    /// Records written per processed source
    pub records: BTreeMap<SourceKind, usize>,
    pub index: Index,
    pub index_changed: bool,
}

impl RunReport {
    #[must_use]
    pub fn total_records(&self) -> usize {
        self.records.values().sum()
    }
}

pub struct Orchestrator {
    resolver: PathResolver,
    writer: ArtifactWriter,
    index_path: PathBuf,
    locations: Vec<Location>,
    pipelines: Vec<Box<dyn SourcePipeline>>,
    clock: Box<dyn Clock>,
    fetch_deadline: Duration,
    daily_digest: bool,
}

impl Orchestrator {
    pub fn new(resolver: PathResolver, index_path: impl Into<PathBuf>, locations: Vec<Location>) -> Self {
        Self {
            resolver,
            writer: ArtifactWriter,
            index_path: index_path.into(),
            locations,
            pipelines: Vec::new(),
            clock: Box::new(SystemClock),
            fetch_deadline: Duration::from_secs(300),
            daily_digest: true,
        }
    }

    /// Wire the HTTP backed pipelines of every source from configuration
    pub fn from_config(config: &AirsoundsConfig) -> Result<Self, AirsoundsError> {
        let timezone = config.timezone().map_err(|e| AirsoundsError::config(format!("{e:#}")))?;
        let client = http_client(config.http_timeout())
            .map_err(|e| AirsoundsError::config(format!("Cannot build HTTP client: {e}")))?;
        let providers = &config.providers;

        let orchestrator = Self::new(
            PathResolver::new(config.data_dir(), timezone),
            config.index_path(),
            config.locations.clone(),
        )
        .with_pipeline(NoaaPipeline::new(
            NoaaClient::new(client.clone(), providers.noaa.clone()),
            providers.noaa.forecast_hours,
        ))
        .with_pipeline(ImsPipeline::new(ImsClient::new(
            client.clone(),
            providers.ims.clone(),
            timezone,
        )))
        .with_pipeline(UwyoPipeline::new(UwyoClient::new(client, providers.uwyo.clone())))
        .with_fetch_deadline(config.fetch_deadline())
        .with_daily_digest(config.storage.daily_digest);
        Ok(orchestrator)
    }

    /// Register the pipeline of a source, replacing any previous one
    #[must_use]
    pub fn with_pipeline<P: SourcePipeline + 'static>(mut self, pipeline: P) -> Self {
        self.pipelines.retain(|p| p.source() != pipeline.source());
        self.pipelines.push(Box::new(pipeline));
        self
    }

    #[must_use]
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Box::new(clock);
        self
    }

    #[must_use]
    pub fn with_fetch_deadline(mut self, deadline: Duration) -> Self {
        self.fetch_deadline = deadline;
        self
    }

    #[must_use]
    pub fn with_daily_digest(mut self, enabled: bool) -> Self {
        self.daily_digest = enabled;
        self
    }

    fn pipeline(&self, source: SourceKind) -> Result<&dyn SourcePipeline, AirsoundsError> {
        self.pipelines
            .iter()
            .find(|p| p.source() == source)
            .map(|p| &**p)
            .ok_or_else(|| AirsoundsError::config(format!("No pipeline configured for {source}")))
    }

    /// Execute one run over the selected sources
    #[instrument(skip(self), fields(data_dir = %self.resolver.root().display()))]
    pub async fn run(&self, selection: SourceSelection) -> Result<RunReport, AirsoundsError> {
        let pipelines = selection
            .sources()
            .into_iter()
            .map(|source| self.pipeline(source))
            .collect::<Result<Vec<_>, _>>()?;

        let mut index = Index::load(&self.index_path)?;
        index.locations.clone_from(&self.locations);

        let mut modified = Vec::new();
        let mut seen = HashSet::new();
        let mut touched_days = BTreeSet::new();
        let mut records = BTreeMap::new();

        for pipeline in pipelines {
            let written = self
                .run_source(pipeline, &mut index, &mut modified, &mut seen, &mut touched_days)
                .await?;
            records.insert(pipeline.source(), written);
        }

        if self.daily_digest {
            for day in &touched_days {
                modified.push(digest::rebuild_day(&self.resolver, &self.writer, *day)?);
            }
        }

        let index_changed = index.persist(&self.index_path)?;

        if !modified.is_empty() || index_changed {
            modified.push(self.index_path.clone());
        }

        info!(
            "Run finished: {} records, {} modified paths, index changed: {}",
            records.values().sum::<usize>(),
            modified.len(),
            index_changed
        );

        Ok(RunReport {
            modified,
            records,
            index,
            index_changed,
        })
    }

    async fn run_source(
        &self,
        pipeline: &dyn SourcePipeline,
        index: &mut Index,
        modified: &mut Vec<PathBuf>,
        seen: &mut HashSet<PathBuf>,
        touched_days: &mut BTreeSet<NaiveDate>,
    ) -> Result<usize, AirsoundsError> {
        let source = pipeline.source();
        let ctx = FetchContext {
            locations: &self.locations,
            now: self.clock.now(),
            timezone: self.resolver.timezone(),
        };

        info!("Fetching {}", source);
        let fetched = match tokio::time::timeout(self.fetch_deadline, pipeline.fetch(&ctx)).await {
            Ok(result) => result.map_err(|e| AirsoundsError::fetch(source, e))?,
            Err(_) => {
                return Err(AirsoundsError::Timeout {
                    provider: source,
                    after: self.fetch_deadline,
                });
            }
        };

        let policy = pipeline.stamp_policy();
        for record in &fetched {
            let path = self.resolver.resolve(source, &record.target, record.valid_time);
            self.writer.write(&path, &record.payload)?;
            index.fold(source, record.valid_time);
            if policy == StampPolicy::PerRecord {
                index.stamp(source, self.clock.now());
            }
            touched_days.insert(self.resolver.local_day(record.valid_time));
            debug!("Wrote {}", path.display());
            if seen.insert(path.clone()) {
                modified.push(path);
            }
        }
        if policy == StampPolicy::PerBatch {
            index.stamp(source, ctx.now);
        }

        info!("Wrote {} {} records", fetched.len(), source);
        Ok(fetched.len())
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("resolver", &self.resolver)
            .field("index_path", &self.index_path)
            .field("locations", &self.locations.len())
            .field(
                "pipelines",
                &self.pipelines.iter().map(|p| p.source()).collect::<Vec<_>>(),
            )
            .field("fetch_deadline", &self.fetch_deadline)
            .field("daily_digest", &self.daily_digest)
            .finish()
    }
}
