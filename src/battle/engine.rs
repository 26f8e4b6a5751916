use super::config::{BattleConfig, NarrationPolicy};
use super::outcome::{classify, classify_strict, clean_narration};
use super::stats::apply_outcome;
use crate::hub::BroadcastHub;
use crate::model::{Agent, AgentId, BattleEvent, BattleOutcome, NewBattle, PriceObservation};
use crate::narrator::OutcomeNarrator;
use crate::oracle::PriceOracle;
use crate::store::{Repository, RepositoryError};
use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, SubsecRound, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};


/// Counters for one poll cycle.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub agents: usize,
    /// Agents the oracle returned a price for
    pub priced: usize,
    pub seeded: usize,
    pub battles: usize,
    /// No price, no opponent, vanished agent or unrecognized narration
    pub skipped: usize,
    pub failures: usize,
}

/// How one agent's step ended.
#[derive(Debug, PartialEq)]
enum AgentStep {
    Seeded,
    NoTrigger,
    Battled,
    Skipped,
    Failed,
}

/// Periodic price poller that turns price rises into battles.
///
/// One engine runs as a single background task; cycles never overlap and
/// agents within a cycle are handled one after another.
pub struct BattleEngine {
    repository: Arc<dyn Repository>,
    oracle: Arc<dyn PriceOracle>,
    narrator: Arc<dyn OutcomeNarrator>,
    battles: BroadcastHub<BattleEvent>,
    config: BattleConfig,
    last_battle_at: Mutex<Option<DateTime<Utc>>>,
}

impl BattleEngine {
    pub fn new(
        repository: Arc<dyn Repository>,
        oracle: Arc<dyn PriceOracle>,
        narrator: Arc<dyn OutcomeNarrator>,
        battles: BroadcastHub<BattleEvent>,
        config: BattleConfig,
    ) -> Self {
        Self {
            repository,
            oracle,
            narrator,
            battles,
            config,
            last_battle_at: Mutex::new(None),
        }
    }

    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Run poll cycles every `interval_seconds` until `shutdown` fires.
    ///
    /// The first cycle runs one full interval after start. A cycle that is
    /// still in flight when shutdown fires is abandoned between awaits.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let period = self.config.interval();
        info!(
            interval_seconds = self.config.interval_seconds,
            policy = ?self.config.narration_policy,
            "Starting battle engine"
        );

        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                result = self.run_cycle() => match result {
                    Ok(report) => info!(
                        agents = report.agents,
                        priced = report.priced,
                        seeded = report.seeded,
                        battles = report.battles,
                        skipped = report.skipped,
                        failures = report.failures,
                        "Battle cycle complete"
                    ),
                    Err(e) => error!(error = %e, "Battle cycle failed"),
                },
            }
        }

        info!("Battle engine stopped");
    }

    /// One poll cycle: price every agent, battle on strict rises.
    ///
    /// Fails only when the agent list or the batched price lookup fails; every
    /// per-agent problem is logged and counted instead.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let agents = self
            .repository
            .list_agents()
            .context("Failed to list agents")?;

        let mut report = CycleReport {
            agents: agents.len(),
            ..CycleReport::default()
        };
        if agents.is_empty() {
            return Ok(report);
        }

        let token_ids: Vec<String> = agents.iter().map(|a| a.token_address.clone()).collect();
        let prices = self
            .oracle
            .get_prices(&token_ids)
            .await
            .context("Failed to fetch prices")?;

        for agent in agents {
            let Some(&price) = prices.get(&agent.token_address) else {
                warn!(agent_id = agent.id, token = %agent.token_address, "Price unavailable, skipping agent");
                report.skipped += 1;
                continue;
            };
            report.priced += 1;

            match self.process_agent(agent.id, price).await {
                Ok(AgentStep::Seeded) => report.seeded += 1,
                Ok(AgentStep::NoTrigger) => {}
                Ok(AgentStep::Battled) => report.battles += 1,
                Ok(AgentStep::Skipped) => report.skipped += 1,
                Ok(AgentStep::Failed) => report.failures += 1,
                Err(e) => {
                    error!(agent_id = agent.id, error = %e, "Failed to process agent");
                    report.failures += 1;
                }
            }
        }

        Ok(report)
    }

    async fn process_agent(&self, id: AgentId, price: f64) -> Result<AgentStep> {
        // Fresh read: an earlier battle this cycle may have changed this agent's stats
        let mut agent = match self.repository.get_agent(id) {
            Ok(agent) => agent,
            Err(e) if e.is_not_found() => {
                debug!(agent_id = id, "Agent vanished mid-cycle");
                return Ok(AgentStep::Skipped);
            }
            Err(e) => return Err(e).context("Failed to reload agent"),
        };

        match agent.observe_price(price) {
            PriceObservation::Seeded => {
                self.repository
                    .save_agent(&agent)
                    .context("Failed to save seeded price")?;
                debug!(agent_id = id, price, "Seeded first price");
                Ok(AgentStep::Seeded)
            }
            PriceObservation::Rose { previous } => {
                info!(agent_id = id, previous, price, "Price rose, starting battle");
                match self.trigger_battle(&agent).await {
                    Ok(Some(_)) => Ok(AgentStep::Battled),
                    Ok(None) => {
                        self.repository
                            .save_agent(&agent)
                            .context("Failed to save price")?;
                        Ok(AgentStep::Skipped)
                    }
                    Err(e) => {
                        error!(agent_id = id, error = %e, "Battle failed");
                        self.repository
                            .save_agent(&agent)
                            .context("Failed to save price")?;
                        Ok(AgentStep::Failed)
                    }
                }
            }
            PriceObservation::Unchanged | PriceObservation::Fell { .. } => {
                self.repository
                    .save_agent(&agent)
                    .context("Failed to save price")?;
                Ok(AgentStep::NoTrigger)
            }
        }
    }

    /// Resolve, persist and publish one battle with `attacker` on the offensive.
    ///
    /// `Ok(None)` means the battle was skipped (no opponent, or narration the
    /// policy refuses). The attacker's new price is persisted with the battle.
    async fn trigger_battle(&self, attacker: &Agent) -> Result<Option<BattleEvent>> {
        let mut defender = match self.repository.find_random_agent_except(attacker.id) {
            Ok(defender) => defender,
            Err(RepositoryError::NoOpponent(_)) => {
                warn!(agent_id = attacker.id, "No opponent available, skipping battle");
                return Ok(None);
            }
            Err(e) => return Err(e).context("Failed to pick opponent"),
        };

        let Some((outcome, narration)) = self.narrate(attacker, &defender).await? else {
            return Ok(None);
        };

        let mut attacker = attacker.clone();
        apply_outcome(&mut attacker, &mut defender, outcome);

        let battle = NewBattle {
            attacker_id: attacker.id,
            defender_id: defender.id,
            outcome,
            description: clean_narration(&narration, self.config.max_description_chars),
            created_at: self.next_timestamp(),
        };
        let battle = self
            .repository
            .record_battle(battle, &attacker, &defender)
            .context("Failed to record battle")?;

        let event = BattleEvent {
            battle,
            attacker,
            defender,
        };
        let delivery = self.battles.publish(event.clone());

        info!(
            battle_id = event.battle.id,
            attacker_id = event.attacker.id,
            defender_id = event.defender.id,
            outcome = %event.battle.outcome,
            delivered = delivery.delivered,
            dropped = delivery.dropped,
            "Battle recorded"
        );
        Ok(Some(event))
    }

    async fn narrate(
        &self,
        attacker: &Agent,
        defender: &Agent,
    ) -> Result<Option<(BattleOutcome, String)>> {
        let text = self.ask_narrator(attacker, defender).await?;

        match self.config.narration_policy {
            NarrationPolicy::DefaultVictory => {
                let outcome = classify(&text);
                Ok(Some((outcome, text)))
            }
            NarrationPolicy::RetryThenSkip => {
                if let Some(outcome) = classify_strict(&text) {
                    return Ok(Some((outcome, text)));
                }
                warn!(attacker_id = attacker.id, "Narration named no outcome, asking again");

                let retry = self.ask_narrator(attacker, defender).await?;
                match classify_strict(&retry) {
                    Some(outcome) => Ok(Some((outcome, retry))),
                    None => {
                        warn!(attacker_id = attacker.id, defender_id = defender.id, "Narration still unrecognized, skipping battle");
                        Ok(None)
                    }
                }
            }
        }
    }

    async fn ask_narrator(&self, attacker: &Agent, defender: &Agent) -> Result<String> {
        self.narrator
            .narrate(&attacker.name, &attacker.prompt, &defender.name, &defender.prompt)
            .await
            .context("Narration failed")
    }

    /// Battle timestamps strictly increase within one engine, even if the
    /// wall clock stalls or steps back.
    fn next_timestamp(&self) -> DateTime<Utc> {
        let mut last = self
            .last_battle_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let now = Utc::now().trunc_subsecs(6);
        let next = match *last {
            Some(prev) if now <= prev => prev + ChronoDuration::microseconds(1),
            _ => now,
        };
        *last = Some(next);
        next
    }
}
