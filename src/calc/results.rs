//! Result view model - one computed setup and the views derived from it
//!
//! Owns the engine, the solved results, the shared metadata and the
//! first-tier cache. Every view a caller asks for is produced from these
//! without re-running the score cube.

use std::sync::Arc;

use crate::calc::contribution::{
    contributions, Compare, ContributionContext, ContributionFrame, ContributionKind,
    ContributionRequest, Cutoff, FirstTierCache, TotalMode,
};
use crate::calc::driver::{build_results, score_table, LcaResults, ScoreCube};
use crate::calc::engine::{LcaEngine, MatrixEngine, SolveStats};
use crate::calc::inventory::{inventory, InventoryFrame, InventoryKind, InventoryOptions};
use crate::calc::montecarlo::{run_mc, McOptions, McResult};
use crate::calc::sensitivity::{run_gsa, GsaOptions, GsaResult};
use crate::calc::setup::ResolvedSetup;
use crate::calc::worker::{self, JobHandle};
use crate::core::error::CalcError;
use crate::core::frame::Frame;
use crate::core::metadata::MetaDataStore;
use crate::core::progress::Checkpoint;

pub struct ResultViewModel {
    setup: ResolvedSetup,
    metadata: Arc<MetaDataStore>,
    engine: Box<dyn LcaEngine>,
    results: LcaResults,
    first_tier: FirstTierCache,
    mc: Option<McResult>,
}

impl ResultViewModel {
    /// Compute the score cube with the dense matrix engine
    pub fn build(
        setup: ResolvedSetup,
        metadata: Arc<MetaDataStore>,
        checkpoint: &mut Checkpoint<'_>,
    ) -> Result<Self, CalcError> {
        let engine = MatrixEngine::build(&setup)?;
        Self::with_engine(setup, metadata, Box::new(engine), checkpoint)
    }

    pub fn with_engine(
        setup: ResolvedSetup,
        metadata: Arc<MetaDataStore>,
        mut engine: Box<dyn LcaEngine>,
        checkpoint: &mut Checkpoint<'_>,
    ) -> Result<Self, CalcError> {
        let results = build_results(engine.as_mut(), &setup, &metadata, checkpoint)?;
        let mut first_tier = FirstTierCache::new();
        first_tier.ensure(&setup.fingerprint());
        Ok(Self {
            setup,
            metadata,
            engine,
            results,
            first_tier,
            mc: None,
        })
    }

    /// Build on a worker thread
    pub fn spawn(
        setup: ResolvedSetup,
        metadata: Arc<MetaDataStore>,
    ) -> Result<JobHandle<Self>, CalcError> {
        worker::spawn("scores", move |checkpoint| {
            Self::build(setup, metadata, checkpoint)
        })
    }

    pub fn setup(&self) -> &ResolvedSetup {
        &self.setup
    }

    pub fn metadata(&self) -> &Arc<MetaDataStore> {
        &self.metadata
    }

    pub fn results(&self) -> &LcaResults {
        &self.results
    }

    pub fn engine_stats(&self) -> SolveStats {
        self.engine.stats()
    }

    pub fn scores(&self) -> &ScoreCube {
        &self.results.cube
    }

    pub fn score_table(&self, normalized: bool) -> Frame {
        score_table(&self.results, &self.setup, &self.metadata, normalized)
    }

    /// Inventory of the first scenario
    pub fn inventory(
        &self,
        kind: InventoryKind,
        remove_zeros: bool,
        characterized_only: bool,
    ) -> Result<InventoryFrame, CalcError> {
        self.scenario_inventory(
            kind,
            0,
            InventoryOptions {
                remove_zeros,
                characterized_only,
            },
        )
    }

    pub fn scenario_inventory(
        &self,
        kind: InventoryKind,
        scenario: usize,
        options: InventoryOptions,
    ) -> Result<InventoryFrame, CalcError> {
        inventory(&self.results, &self.metadata, kind, scenario, options)
    }

    pub fn contributions(
        &mut self,
        request: &ContributionRequest,
        checkpoint: &mut Checkpoint<'_>,
    ) -> Result<ContributionFrame, CalcError> {
        let ctx = ContributionContext {
            setup: &self.setup,
            results: &self.results,
            metadata: &self.metadata,
        };
        contributions(
            &ctx,
            self.engine.as_mut(),
            &mut self.first_tier,
            request,
            checkpoint,
        )
    }

    pub fn elementary_contributions(
        &mut self,
        compare: Compare,
        cutoff: Cutoff,
        relative: bool,
        total_mode: TotalMode,
        aggregator: Option<&str>,
    ) -> Result<ContributionFrame, CalcError> {
        let request =
            Self::request(ContributionKind::Elementary, compare, cutoff, relative, total_mode, aggregator);
        self.contributions(&request, &mut Checkpoint::none())
    }

    pub fn process_contributions(
        &mut self,
        compare: Compare,
        cutoff: Cutoff,
        relative: bool,
        total_mode: TotalMode,
        aggregator: Option<&str>,
    ) -> Result<ContributionFrame, CalcError> {
        let request =
            Self::request(ContributionKind::Process, compare, cutoff, relative, total_mode, aggregator);
        self.contributions(&request, &mut Checkpoint::none())
    }

    pub fn first_tier_contributions(
        &mut self,
        compare: Compare,
        cutoff: Cutoff,
        relative: bool,
        total_mode: TotalMode,
        aggregator: Option<&str>,
    ) -> Result<ContributionFrame, CalcError> {
        let request =
            Self::request(ContributionKind::FirstTier, compare, cutoff, relative, total_mode, aggregator);
        self.contributions(&request, &mut Checkpoint::none())
    }

    fn request(
        kind: ContributionKind,
        compare: Compare,
        cutoff: Cutoff,
        relative: bool,
        total_mode: TotalMode,
        aggregator: Option<&str>,
    ) -> ContributionRequest {
        let request = ContributionRequest::new(kind, compare)
            .with_cutoff(cutoff)
            .relative(relative)
            .total_mode(total_mode);
        match aggregator {
            Some(field) => request.aggregate_by(field),
            None => request,
        }
    }

    /// Fill the first-tier cache for one scenario ahead of queries
    pub fn precompute_first_tier(
        &mut self,
        scenario: usize,
        checkpoint: &mut Checkpoint<'_>,
    ) -> Result<(), CalcError> {
        self.first_tier.ensure(&self.setup.fingerprint());
        self.first_tier.precompute(
            self.engine.as_mut(),
            &self.setup,
            &self.results,
            scenario,
            checkpoint,
        )
    }

    pub fn first_tier_cache(&self) -> &FirstTierCache {
        &self.first_tier
    }

    /// Run Monte Carlo and keep the result for histograms and GSA
    pub fn run_mc(
        &mut self,
        options: &McOptions,
        checkpoint: &mut Checkpoint<'_>,
    ) -> Result<&McResult, CalcError> {
        let result = run_mc(
            self.engine.as_mut(),
            &self.setup,
            &self.metadata,
            options,
            checkpoint,
        )?;
        Ok(self.mc.insert(result))
    }

    pub fn mc_result(&self) -> Option<&McResult> {
        self.mc.as_ref()
    }

    /// Sampled scores of one method: one row per iteration, one column per FU
    pub fn mc_histogram(&self, method: usize) -> Result<Frame, CalcError> {
        self.require_mc()?.to_frame(method)
    }

    pub fn run_gsa(&self, options: &GsaOptions) -> Result<GsaResult, CalcError> {
        run_gsa(self.require_mc()?, &self.metadata, options)
    }

    fn require_mc(&self) -> Result<&McResult, CalcError> {
        self.mc.as_ref().ok_or_else(|| {
            CalcError::Insufficient("no Monte Carlo result; run Monte Carlo first".into())
        })
    }
}
