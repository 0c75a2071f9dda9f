//! The reconciliation loop: resolve, detect, render, reload.

use log::{debug, error, info};
use tokio::time::{interval, MissedTickBehavior};

use crate::config::Settings;
use crate::error::ReloadError;
use crate::fingerprint::ChangeDetector;
use crate::provider::ClusterProvider;
use crate::reload::reload;
use crate::render::render;
use crate::resolver::Resolver;

/// How a single cycle ended.  Only a failed reload stops the loop, and
/// that is reported as an `Err` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Resolving or fingerprinting failed; nothing was rendered.
    Skipped,
    Unchanged,
    /// The template or output file failed; no reload was attempted and
    /// the change is retried next cycle.
    RenderFailed,
    Reloaded,
}

pub struct Reconciler<P> {
    resolver: Resolver<P>,
    detector: ChangeDetector,
    settings: Settings,
}

impl<P: ClusterProvider> Reconciler<P> {
    pub fn new(provider: P, settings: Settings) -> Self {
        Self {
            resolver: Resolver::new(provider, settings.own_task_name.clone()),
            detector: ChangeDetector::new(settings.state_file.clone()),
            settings,
        }
    }

    pub fn provider(&self) -> &P {
        self.resolver.provider()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Run one cycle.  The fingerprint is committed only after the reload
    /// succeeded, so any failure earlier in the chain is retried.  A render
    /// that keeps failing is therefore attempted (and logged) every cycle.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, ReloadError> {
        let settings = &self.settings;

        let endpoints = match self
            .resolver
            .resolve(&settings.cluster, &settings.host_var)
            .await
        {
            Ok(endpoints) => endpoints,
            Err(e) => {
                error!("skipping cycle: {}", e);
                return Ok(CycleOutcome::Skipped);
            }
        };

        let change = match self.detector.check(&endpoints, &settings.template).await {
            Ok(change) => change,
            Err(e) => {
                error!("skipping cycle: {}", e);
                return Ok(CycleOutcome::Skipped);
            }
        };
        if !change.changed {
            return Ok(CycleOutcome::Unchanged);
        }

        if let Err(e) = render(&endpoints, &settings.template, &settings.output).await {
            error!("render failed, not reloading: {}", e);
            return Ok(CycleOutcome::RenderFailed);
        }

        if let Err(e) = reload(&settings.reload_command).await {
            error!("failed to run signal command: {}", e);
            if let ReloadError::Failed { output, .. } = &e {
                error!("{}", output.trim_end());
            }
            return Err(e);
        }

        self.detector.commit(&change.fingerprint).await;
        Ok(CycleOutcome::Reloaded)
    }

    /// Run a single cycle in once mode, otherwise forever at the
    /// configured interval.  The first cycle starts immediately.
    pub async fn run(&self) -> Result<(), ReloadError> {
        if self.settings.once {
            let outcome = self.run_cycle().await?;
            info!("single run finished: {:?}", outcome);
            return Ok(());
        }

        info!(
            "polling cluster {} every {}s",
            self.settings.cluster,
            self.settings.interval.as_secs()
        );
        let mut ticker = interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let outcome = self.run_cycle().await?;
            debug!("cycle finished: {:?}", outcome);
        }
    }
}
