//! SQLite-backed repository.
//!
//! # Schema
//! ```sql
//! CREATE TABLE agents (
//!     id INTEGER PRIMARY KEY AUTOINCREMENT,   -- never reused
//!     name, ticker, prompt, description, image_url, token_address,
//!     user_wallet_address TEXT NOT NULL,
//!     created_at, updated_at TEXT NOT NULL,   -- RFC 3339, microseconds, UTC
//!     previous_price, highest_price REAL NOT NULL DEFAULT 0,
//!     total, wins, losses INTEGER NOT NULL DEFAULT 0,
//!     win_rate REAL NOT NULL DEFAULT 0
//! );
//! CREATE TABLE battles (
//!     id INTEGER PRIMARY KEY AUTOINCREMENT,
//!     attacker_id, defender_id INTEGER NOT NULL REFERENCES agents(id),
//!     outcome TEXT NOT NULL,                  -- TOTAL_VICTORY, ...
//!     description TEXT NOT NULL,
//!     created_at TEXT NOT NULL,
//!     CHECK (attacker_id <> defender_id)
//! );
//! ```
//!
//! The connection sits behind a `Mutex`, so every repository call is
//! serialized. Multi-row writes go through a rusqlite `Transaction`, which
//! rolls back when dropped without `commit()`.

use super::{Repository, RepositoryError};
use crate::model::{Agent, AgentId, Battle, BattleId, BattleOutcome, NewAgent, NewBattle};
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rand::Rng;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::info;

const AGENT_COLUMNS: &str = "id, name, ticker, prompt, description, image_url, token_address, \
     user_wallet_address, created_at, updated_at, previous_price, highest_price, \
     total, wins, losses, win_rate";

const BATTLE_COLUMNS: &str = "id, attacker_id, defender_id, outcome, description, created_at";

pub struct SqliteRepository {
    conn: Mutex<Connection>,
}

impl SqliteRepository {
    /// Opens (or creates) the database and ensures the schema exists.
    ///
    /// Pass `":memory:"` for a throwaway store.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open arena DB at {}", db_path.display()))?;

        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS agents (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                name                TEXT NOT NULL,
                ticker              TEXT NOT NULL,
                prompt              TEXT NOT NULL,
                description         TEXT NOT NULL,
                image_url           TEXT NOT NULL,
                token_address       TEXT NOT NULL,
                user_wallet_address TEXT NOT NULL,
                created_at          TEXT NOT NULL,
                updated_at          TEXT NOT NULL,
                previous_price      REAL NOT NULL DEFAULT 0,
                highest_price       REAL NOT NULL DEFAULT 0,
                total               INTEGER NOT NULL DEFAULT 0,
                wins                INTEGER NOT NULL DEFAULT 0,
                losses              INTEGER NOT NULL DEFAULT 0,
                win_rate            REAL NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS battles (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                attacker_id INTEGER NOT NULL REFERENCES agents(id),
                defender_id INTEGER NOT NULL REFERENCES agents(id),
                outcome     TEXT NOT NULL,
                description TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                CHECK (attacker_id <> defender_id)
            );

            CREATE INDEX IF NOT EXISTS idx_battles_attacker ON battles(attacker_id);
            CREATE INDEX IF NOT EXISTS idx_battles_defender ON battles(defender_id);
            "#,
        )
        .context("Failed to create arena schema")?;

        info!(path = %db_path.display(), "Arena store opened");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, RepositoryError> {
        self.conn.lock().map_err(|_| RepositoryError::Poisoned)
    }
}

impl Repository for SqliteRepository {
    fn create_agent(&self, agent: NewAgent) -> Result<Agent, RepositoryError> {
        let now = Utc::now().trunc_subsecs(6);
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO agents (
                name, ticker, prompt, description, image_url, token_address,
                user_wallet_address, created_at, updated_at, highest_price
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                agent.name,
                agent.ticker,
                agent.prompt,
                agent.description,
                agent.image_url,
                agent.token_address,
                agent.user_wallet_address,
                timestamp(&now),
                timestamp(&now),
                agent.highest_price,
            ],
        )?;

        Ok(Agent {
            id: conn.last_insert_rowid(),
            name: agent.name,
            ticker: agent.ticker,
            prompt: agent.prompt,
            description: agent.description,
            image_url: agent.image_url,
            token_address: agent.token_address,
            user_wallet_address: agent.user_wallet_address,
            created_at: now,
            updated_at: now,
            previous_price: 0.0,
            highest_price: agent.highest_price,
            total: 0,
            wins: 0,
            losses: 0,
            win_rate: 0.0,
        })
    }

    fn list_agents(&self) -> Result<Vec<Agent>, RepositoryError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM agents ORDER BY id ASC",
            AGENT_COLUMNS
        ))?;
        let agents = stmt
            .query_map([], agent_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(agents)
    }

    fn get_agent(&self, id: AgentId) -> Result<Agent, RepositoryError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {} FROM agents WHERE id = ?1", AGENT_COLUMNS),
            params![id],
            agent_from_row,
        )
        .optional()?
        .ok_or(RepositoryError::NotFound { entity: "agent", id })
    }

    fn list_agents_page(
        &self,
        offset: u32,
        limit: u32,
    ) -> Result<(Vec<Agent>, u64), RepositoryError> {
        let conn = self.conn()?;
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM agents", [], |row| row.get(0))?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM agents ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2",
            AGENT_COLUMNS
        ))?;
        let agents = stmt
            .query_map(params![limit, offset], agent_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok((agents, total.max(0) as u64))
    }

    fn leaderboard(&self, limit: u32) -> Result<Vec<Agent>, RepositoryError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM agents
             ORDER BY wins DESC, win_rate DESC, created_at ASC, id ASC
             LIMIT ?1",
            AGENT_COLUMNS
        ))?;
        let agents = stmt
            .query_map(params![limit], agent_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(agents)
    }

    fn save_agent(&self, agent: &Agent) -> Result<(), RepositoryError> {
        let conn = self.conn()?;
        update_agent(&conn, agent)
    }

    fn find_random_agent_except(&self, id: AgentId) -> Result<Agent, RepositoryError> {
        let conn = self.conn()?;
        let candidates: i64 = conn.query_row(
            "SELECT COUNT(*) FROM agents WHERE id <> ?1",
            params![id],
            |row| row.get(0),
        )?;
        if candidates == 0 {
            return Err(RepositoryError::NoOpponent(id));
        }

        let offset = rand::thread_rng().gen_range(0..candidates);
        let opponent = conn.query_row(
            &format!(
                "SELECT {} FROM agents WHERE id <> ?1 ORDER BY id LIMIT 1 OFFSET ?2",
                AGENT_COLUMNS
            ),
            params![id, offset],
            agent_from_row,
        )?;
        Ok(opponent)
    }

    fn create_battle(&self, battle: NewBattle) -> Result<Battle, RepositoryError> {
        let conn = self.conn()?;
        insert_battle(&conn, battle)
    }

    fn record_battle(
        &self,
        battle: NewBattle,
        attacker: &Agent,
        defender: &Agent,
    ) -> Result<Battle, RepositoryError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let battle = insert_battle(&tx, battle)?;
        update_agent(&tx, attacker)?;
        update_agent(&tx, defender)?;

        tx.commit()?;
        Ok(battle)
    }

    fn get_battle(&self, id: BattleId) -> Result<Battle, RepositoryError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {} FROM battles WHERE id = ?1", BATTLE_COLUMNS),
            params![id],
            battle_from_row,
        )
        .optional()?
        .ok_or(RepositoryError::NotFound { entity: "battle", id })
    }

    fn list_battles_for_agent(&self, id: AgentId) -> Result<Vec<Battle>, RepositoryError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM battles
             WHERE attacker_id = ?1 OR defender_id = ?1
             ORDER BY created_at DESC, id DESC",
            BATTLE_COLUMNS
        ))?;
        let battles = stmt
            .query_map(params![id], battle_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(battles)
    }
}

fn insert_battle(conn: &Connection, battle: NewBattle) -> Result<Battle, RepositoryError> {
    conn.execute(
        "INSERT INTO battles (attacker_id, defender_id, outcome, description, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            battle.attacker_id,
            battle.defender_id,
            battle.outcome.as_str(),
            battle.description,
            timestamp(&battle.created_at),
        ],
    )?;

    Ok(Battle {
        id: conn.last_insert_rowid(),
        attacker_id: battle.attacker_id,
        defender_id: battle.defender_id,
        outcome: battle.outcome,
        description: battle.description,
        created_at: battle.created_at,
    })
}

fn update_agent(conn: &Connection, agent: &Agent) -> Result<(), RepositoryError> {
    let updated = conn.execute(
        "UPDATE agents SET
            name = ?2, ticker = ?3, prompt = ?4, description = ?5, image_url = ?6,
            token_address = ?7, user_wallet_address = ?8, updated_at = ?9,
            previous_price = ?10, highest_price = ?11,
            total = ?12, wins = ?13, losses = ?14, win_rate = ?15
         WHERE id = ?1",
        params![
            agent.id,
            agent.name,
            agent.ticker,
            agent.prompt,
            agent.description,
            agent.image_url,
            agent.token_address,
            agent.user_wallet_address,
            timestamp(&Utc::now()),
            agent.previous_price,
            agent.highest_price,
            agent.total,
            agent.wins,
            agent.losses,
            agent.win_rate,
        ],
    )?;

    if updated == 0 {
        return Err(RepositoryError::NotFound {
            entity: "agent",
            id: agent.id,
        });
    }
    Ok(())
}

/// Fixed-width UTC timestamps so that TEXT ordering matches time ordering.
fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn agent_from_row(row: &Row<'_>) -> rusqlite::Result<Agent> {
    Ok(Agent {
        id: row.get(0)?,
        name: row.get(1)?,
        ticker: row.get(2)?,
        prompt: row.get(3)?,
        description: row.get(4)?,
        image_url: row.get(5)?,
        token_address: row.get(6)?,
        user_wallet_address: row.get(7)?,
        created_at: parse_timestamp(row, 8)?,
        updated_at: parse_timestamp(row, 9)?,
        previous_price: row.get(10)?,
        highest_price: row.get(11)?,
        total: row.get(12)?,
        wins: row.get(13)?,
        losses: row.get(14)?,
        win_rate: row.get(15)?,
    })
}

fn battle_from_row(row: &Row<'_>) -> rusqlite::Result<Battle> {
    let outcome: String = row.get(3)?;
    let outcome = outcome
        .parse::<BattleOutcome>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, e.into()))?;

    Ok(Battle {
        id: row.get(0)?,
        attacker_id: row.get(1)?,
        defender_id: row.get(2)?,
        outcome,
        description: row.get(4)?,
        created_at: parse_timestamp(row, 5)?,
    })
}
