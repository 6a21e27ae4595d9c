//! Sampling session: configuration, data and the Gibbs loop
//!
//! ```text
//! Uninitialized --init--> Initialized --step--> BurningIn --step--> Sampling --step--> Finished
//!        \                                                                  ^
//!         \--init (store has a checkpoint)--> phase of the restored iteration
//! ```
//!
//! Each [`Session::step`] runs one full sweep:
//!
//! 1. noise precision of every data block
//! 2. every mode's prior (entities in parallel, then hyperparameters)
//! 3. predictions on the test cells
//! 4. optional sample snapshot and checkpoint
//!
//! Any error moves the session to [`SessionPhase::Failed`]; it takes no
//! further steps.

use crate::block::{mode_sizes, DataBlock};
use crate::checkpoint::{CheckpointStore, SnapshotKind, StepSnapshot};
use crate::config::SessionConfig;
use crate::model::Model;
use crate::priors::{update_mode, LatentPrior, PriorKind, SamplePrior};
use crate::result::PredictionResult;
use crate::side_info::SideInfo;
use crate::status::{SessionPhase, StatusRecord};
use crate::pool::WorkerPool;
use bptf_core::{BptfError, BptfResult, DataSource};
use std::time::Instant;
use tracing::{debug, error, info};

fn clock_seed() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

/// Collects data and side information for a [`Session`]
pub struct SessionBuilder {
    config: SessionConfig,
    train: Option<Box<dyn DataSource>>,
    aux: Vec<(Box<dyn DataSource>, Vec<usize>)>,
    test: Option<Box<dyn DataSource>>,
    side_info: Vec<(usize, SideInfo)>,
}

impl SessionBuilder {
    pub fn train(mut self, data: impl DataSource + 'static) -> Self {
        self.train = Some(Box::new(data));
        self
    }

    /// Additional observations placed at `offsets` in the model's entity space
    pub fn aux_data(mut self, data: impl DataSource + 'static, offsets: Vec<usize>) -> Self {
        self.aux.push((Box::new(data), offsets));
        self
    }

    pub fn test(mut self, data: impl DataSource + 'static) -> Self {
        self.test = Some(Box::new(data));
        self
    }

    pub fn side_info(mut self, mode: usize, side_info: SideInfo) -> Self {
        self.side_info.push((mode, side_info));
        self
    }

    /// Validate everything and assemble the session
    ///
    /// # Errors
    ///
    /// [`BptfError::Configuration`] for invalid settings, missing training
    /// data, prior/side-information mismatches or test data outside the
    /// model; [`BptfError::Io`] if the save directory cannot be prepared.
    pub fn build(self) -> BptfResult<Session> {
        let mut config = self.config;
        config.validate()?;

        let train = self
            .train
            .ok_or_else(|| BptfError::configuration("no training data"))?;
        let mut blocks = vec![DataBlock::at_origin(train)?];
        for (data, offsets) in self.aux {
            blocks.push(DataBlock::new(data, offsets)?);
        }
        let dims = mode_sizes(&blocks)?;
        let nmodes = dims.len();
        if nmodes < 2 {
            return Err(BptfError::configuration(
                "factorization needs at least two modes",
            ));
        }

        let kinds = if config.priors.is_empty() {
            vec![PriorKind::Default; nmodes]
        } else if config.priors.len() == nmodes {
            config.priors.clone()
        } else {
            return Err(BptfError::configuration(format!(
                "{} priors configured for {} modes",
                config.priors.len(),
                nmodes
            )));
        };

        let mut side: Vec<Option<SideInfo>> = vec![None; nmodes];
        for (mode, si) in self.side_info {
            if mode >= nmodes {
                return Err(BptfError::configuration(format!(
                    "side info for mode {} but the data has {} modes",
                    mode, nmodes
                )));
            }
            if side[mode].is_some() {
                return Err(BptfError::configuration(format!(
                    "side info given twice for mode {}",
                    mode
                )));
            }
            si.validate(mode, dims[mode])?;
            side[mode] = Some(si);
        }
        let priors = kinds
            .into_iter()
            .zip(side)
            .enumerate()
            .map(|(mode, (kind, si))| LatentPrior::build(kind, mode, config.num_latent, si))
            .collect::<BptfResult<Vec<_>>>()?;

        let result = match self.test {
            Some(test) => {
                let fits = test.nmodes() == nmodes
                    && test.dims().iter().zip(dims.iter()).all(|(t, d)| t <= d);
                if !fits {
                    return Err(BptfError::configuration(format!(
                        "test data of shape {:?} does not fit a model of shape {:?}",
                        test.dims(),
                        dims
                    )));
                }
                Some(PredictionResult::from_test(test.as_ref()).with_threshold(config.threshold))
            }
            None => None,
        };

        let seed = *config.seed.get_or_insert_with(clock_seed);
        let pool = WorkerPool::new(config.num_threads, seed)?;
        let store = match &config.save_dir {
            Some(dir) => Some(CheckpointStore::open(dir, &config)?),
            None => None,
        };

        info!(
            dims = ?dims,
            num_latent = config.num_latent,
            blocks = blocks.len(),
            workers = pool.num_workers(),
            seed,
            "session built"
        );
        Ok(Session {
            config,
            dims,
            phase: SessionPhase::Uninitialized,
            iteration: 0,
            model: None,
            priors,
            blocks,
            result,
            pool,
            store,
            started: Instant::now(),
            elapsed_before: 0.0,
        })
    }
}

/// A Gibbs sampling run
pub struct Session {
    config: SessionConfig,
    dims: Vec<usize>,
    phase: SessionPhase,
    /// Completed iterations
    iteration: usize,
    model: Option<Model>,
    priors: Vec<LatentPrior>,
    blocks: Vec<DataBlock>,
    result: Option<PredictionResult>,
    pool: WorkerPool,
    store: Option<CheckpointStore>,
    started: Instant,
    /// Time spent before the restored checkpoint
    elapsed_before: f64,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("dims", &self.dims)
            .field("phase", &self.phase)
            .field("iteration", &self.iteration)
            .field("blocks", &self.blocks)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn builder(config: SessionConfig) -> SessionBuilder {
        SessionBuilder {
            config,
            train: None,
            aux: Vec::new(),
            test: None,
            side_info: Vec::new(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Resolved master seed
    pub fn seed(&self) -> u64 {
        self.config.seed.unwrap_or_default()
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn model(&self) -> Option<&Model> {
        self.model.as_ref()
    }

    pub fn priors(&self) -> &[LatentPrior] {
        &self.priors
    }

    pub fn blocks(&self) -> &[DataBlock] {
        &self.blocks
    }

    pub fn result(&self) -> Option<&PredictionResult> {
        self.result.as_ref()
    }

    pub fn store(&self) -> Option<&CheckpointStore> {
        self.store.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.phase == SessionPhase::Finished
    }

    fn elapsed_secs(&self) -> f64 {
        self.elapsed_before + self.started.elapsed().as_secs_f64()
    }

    fn phase_after(&self, iteration: usize) -> SessionPhase {
        if iteration >= self.config.total_iterations() {
            SessionPhase::Finished
        } else if iteration == 0 {
            SessionPhase::Initialized
        } else if iteration <= self.config.burnin {
            SessionPhase::BurningIn
        } else {
            SessionPhase::Sampling
        }
    }

    /// Build a fresh model, or resume from the store's latest checkpoint
    pub fn init(&mut self) -> BptfResult<()> {
        if self.phase != SessionPhase::Uninitialized {
            return Err(BptfError::invalid_state(format!(
                "init called on a session in phase {}",
                self.phase
            )));
        }
        self.started = Instant::now();
        let outcome = self.init_inner();
        if outcome.is_err() {
            self.phase = SessionPhase::Failed;
        }
        outcome
    }

    fn init_inner(&mut self) -> BptfResult<()> {
        for block in &mut self.blocks {
            block.init_noise()?;
        }
        let snapshot = match &self.store {
            Some(store) => store.load_latest_checkpoint()?,
            None => None,
        };
        match snapshot {
            Some(snapshot) => self.restore(snapshot)?,
            None => {
                let rng = self.pool.master_rng();
                let mut model =
                    Model::new(&self.dims, self.config.num_latent, self.config.init, rng)?;
                for prior in &mut self.priors {
                    prior.init(&mut model, rng)?;
                }
                self.model = Some(model);
                self.phase = SessionPhase::Initialized;
                if let Some(store) = &mut self.store {
                    store.set_config(&self.config)?;
                }
                info!(init = %self.config.init, "model initialized");
            }
        }
        Ok(())
    }

    /// Continue from a saved checkpoint
    ///
    /// The random streams are reseeded with `seed + iteration`, so a resumed
    /// run is reproducible but does not replay the interrupted one draw for
    /// draw.
    fn restore(&mut self, snapshot: StepSnapshot) -> BptfResult<()> {
        let model = Model::from_record(&snapshot.model)?;
        if model.dims() != self.dims || model.num_latent() != self.config.num_latent {
            return Err(BptfError::configuration(format!(
                "checkpoint '{}' holds a {:?} model with {} latent dimensions; \
                 the session expects {:?} with {}",
                snapshot.name,
                model.dims(),
                model.num_latent(),
                self.dims,
                self.config.num_latent
            )));
        }
        if snapshot.priors.len() != self.priors.len() || snapshot.noise.len() != self.blocks.len() {
            return Err(BptfError::configuration(format!(
                "checkpoint '{}' has {} priors and {} noise models; the session has {} and {}",
                snapshot.name,
                snapshot.priors.len(),
                snapshot.noise.len(),
                self.priors.len(),
                self.blocks.len()
            )));
        }
        for (prior, state) in self.priors.iter_mut().zip(&snapshot.priors) {
            prior.restore(state, &model)?;
        }
        for (block, noise) in self.blocks.iter_mut().zip(&snapshot.noise) {
            block.noise_mut().restore(noise)?;
        }
        match (&mut self.result, snapshot.result) {
            (Some(result), Some(saved)) if saved.len() == result.len() => *result = saved,
            (Some(_), _) => {
                return Err(BptfError::configuration(format!(
                    "checkpoint '{}' does not match the test data",
                    snapshot.name
                )))
            }
            (None, _) => {}
        }

        self.iteration = snapshot.iteration;
        self.elapsed_before = snapshot.elapsed_secs;
        self.pool
            .reseed(self.seed().wrapping_add(snapshot.iteration as u64));
        self.model = Some(model);
        self.phase = self.phase_after(self.iteration);
        info!(
            checkpoint = %snapshot.name,
            iteration = self.iteration,
            phase = %self.phase,
            "resumed from checkpoint"
        );
        Ok(())
    }

    /// Run one Gibbs iteration
    ///
    /// # Errors
    ///
    /// [`BptfError::InvalidState`] before [`Session::init`], after the last
    /// iteration or after a failure; otherwise whatever the sweep hit, after
    /// which the session is [`SessionPhase::Failed`].
    pub fn step(&mut self) -> BptfResult<StatusRecord> {
        match self.phase {
            SessionPhase::Uninitialized => {
                return Err(BptfError::invalid_state("step called before init"))
            }
            SessionPhase::Finished => {
                return Err(BptfError::invalid_state("session already finished"))
            }
            SessionPhase::Failed => {
                return Err(BptfError::invalid_state("session failed and cannot continue"))
            }
            _ => {}
        }
        match self.sweep() {
            Ok(()) => {
                let status = self.status();
                if self.config.verbose > 0 {
                    info!(
                        iteration = status.iteration,
                        phase = %status.phase,
                        rmse_avg = ?status.rmse_avg,
                        rmse_1sample = ?status.rmse_1sample,
                        "{}",
                        status
                    );
                    if self.config.verbose > 1 {
                        for line in status.priors.iter().chain(status.noise.iter()) {
                            info!("  {}", line);
                        }
                    }
                } else {
                    debug!(iteration = status.iteration, "iteration done");
                }
                Ok(status)
            }
            Err(e) => {
                self.phase = SessionPhase::Failed;
                error!(iteration = self.iteration + 1, error = %e, "iteration failed");
                Err(e)
            }
        }
    }

    fn sweep(&mut self) -> BptfResult<()> {
        let model = self
            .model
            .as_mut()
            .ok_or_else(|| BptfError::invalid_state("no model; call init first"))?;
        let is_sample = self.iteration >= self.config.burnin;
        self.phase = if is_sample {
            SessionPhase::Sampling
        } else {
            SessionPhase::BurningIn
        };

        for block in &mut self.blocks {
            block.update_noise(model, self.pool.master_rng())?;
        }
        for prior in &mut self.priors {
            update_mode(prior, model, &self.blocks, &mut self.pool)?;
        }
        self.iteration += 1;

        if let Some(result) = &mut self.result {
            let model: &Model = model;
            self.pool
                .install(|| result.accumulate(model, is_sample));
        }

        if is_sample {
            let sample = self.iteration - self.config.burnin;
            if self.config.saves_sample(sample) {
                self.save(SnapshotKind::Sample, StepSnapshot::sample_name(sample))?;
            }
        }
        if self.config.checkpoints_at(self.iteration) {
            self.save(
                SnapshotKind::Checkpoint,
                StepSnapshot::checkpoint_name(self.iteration),
            )?;
        }
        if self.iteration >= self.config.total_iterations() {
            self.phase = SessionPhase::Finished;
        }
        Ok(())
    }

    /// Current state as a snapshot
    pub fn snapshot(&self, kind: SnapshotKind, name: String) -> BptfResult<StepSnapshot> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| BptfError::invalid_state("no model; call init first"))?;
        Ok(StepSnapshot {
            name,
            kind,
            iteration: self.iteration,
            elapsed_secs: self.elapsed_secs(),
            model: model.to_record(),
            priors: self.priors.iter().map(SamplePrior::save).collect(),
            noise: self.blocks.iter().map(|b| b.noise().clone()).collect(),
            result: self.result.clone(),
        })
    }

    fn save(&mut self, kind: SnapshotKind, name: String) -> BptfResult<()> {
        let snapshot = self.snapshot(kind, name)?;
        let store = self
            .store
            .as_mut()
            .ok_or_else(|| BptfError::configuration("no save directory configured"))?;
        store.write(&snapshot)
    }

    /// Run until finished, initializing first if needed
    pub fn run(&mut self) -> BptfResult<StatusRecord> {
        if self.phase == SessionPhase::Uninitialized {
            self.init()?;
        }
        while !self.is_finished() {
            self.step()?;
        }
        let status = self.status();
        info!(
            iterations = status.iteration,
            elapsed_secs = status.elapsed_secs,
            rmse_avg = ?status.rmse_avg,
            "sampling finished"
        );
        Ok(status)
    }

    pub fn status(&self) -> StatusRecord {
        let result = self.result.as_ref();
        StatusRecord {
            iteration: self.iteration,
            phase: self.phase,
            elapsed_secs: self.elapsed_secs(),
            rmse_avg: result.and_then(PredictionResult::rmse_avg),
            rmse_1sample: result.and_then(PredictionResult::rmse_1sample),
            auc_avg: result.and_then(PredictionResult::auc_avg),
            auc_1sample: result.and_then(PredictionResult::auc_1sample),
            priors: self.priors.iter().map(SamplePrior::status).collect(),
            noise: self.blocks.iter().map(|b| b.noise().to_string()).collect(),
        }
    }
}
