//! SQLite-backed long-term memory
//!
//! One connection, used only from the control thread. Every write is a single
//! autocommitted statement.

use super::records::{
    NewSkill, ObjectRecord, Skill, SkillCluster, State, INITIAL_EXPLORE_COUNT, INITIAL_FITNESS,
    INITIAL_TRIALS,
};
use crate::core::error::{AgentError, Result};
use crate::core::types::{ClusterId, Fingerprint, NodeId, ObjectId, Screen, SkillId, StateId};
use crate::perception::image_ops::{decode_png, encode_png};
use crate::perception::DetectedObject;
use crate::tree::SearchTree;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::Path;
use tracing::debug;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS states (
    id INTEGER PRIMARY KEY,
    fingerprint BLOB NOT NULL,
    tree TEXT NOT NULL,          -- JSON search tree
    object_ids TEXT NOT NULL,    -- JSON array
    cluster_ids TEXT NOT NULL,   -- JSON array
    screenshot BLOB              -- PNG
);

CREATE TABLE IF NOT EXISTS objects (
    id INTEGER PRIMARY KEY,
    state_id INTEGER NOT NULL,
    name TEXT,
    image BLOB NOT NULL,         -- PNG
    hash INTEGER NOT NULL,       -- 64-bit average hash
    area INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS skills (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT NOT NULL,
    operations TEXT NOT NULL,    -- JSON array of operations
    fitness INTEGER NOT NULL,
    trials INTEGER NOT NULL,
    state_id INTEGER NOT NULL,
    node_id INTEGER,
    image_before BLOB,
    image_after BLOB
);

CREATE TABLE IF NOT EXISTS skill_clusters (
    id INTEGER PRIMARY KEY,
    fingerprint BLOB NOT NULL,
    name TEXT NOT NULL,
    description TEXT NOT NULL,
    members TEXT NOT NULL,       -- JSON array of skill ids
    explore_count INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_objects_state ON objects(state_id);
CREATE INDEX IF NOT EXISTS idx_skills_state ON skills(state_id);
"#;

const SKILL_COLUMNS: &str = "id, name, description, operations, fitness, trials, state_id, node_id";
const CLUSTER_COLUMNS: &str = "id, fingerprint, name, description, members, explore_count";
const STATE_COLUMNS: &str = "id, fingerprint, tree, object_ids, cluster_ids";

const LAST_STEP_KEY: &str = "last_step";

pub struct MemoryStore {
    conn: Connection,
}

fn corrupt(what: &str, id: i64, err: impl std::fmt::Display) -> AgentError {
    AgentError::Corrupt(format!("{} {}: {}", what, id, err))
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Raw state row before JSON decoding
type StateRow = (i64, Vec<u8>, String, String, String);

fn state_row(row: &Row<'_>) -> rusqlite::Result<StateRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn decode_state((id, fp, tree, objects, clusters): StateRow) -> Result<State> {
    let fingerprint =
        Fingerprint::from_bytes(&fp).ok_or_else(|| corrupt("state", id, "bad fingerprint blob"))?;
    Ok(State {
        id: StateId(id),
        fingerprint,
        tree: SearchTree::from_json(&tree).map_err(|e| corrupt("state", id, e))?,
        object_ids: serde_json::from_str(&objects).map_err(|e| corrupt("state", id, e))?,
        cluster_ids: serde_json::from_str(&clusters).map_err(|e| corrupt("state", id, e))?,
    })
}

type SkillRow = (i64, String, String, String, i64, i64, i64, Option<i64>);

fn skill_row(row: &Row<'_>) -> rusqlite::Result<SkillRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn decode_skill(
    (id, name, description, operations, fitness, trials, state_id, node_id): SkillRow,
) -> Result<Skill> {
    Ok(Skill {
        id: SkillId(id),
        name,
        description,
        operations: serde_json::from_str(&operations).map_err(|e| corrupt("skill", id, e))?,
        fitness,
        trials: u32::try_from(trials).map_err(|e| corrupt("skill", id, e))?,
        state_id: StateId(state_id),
        node_id: node_id
            .map(|n| u32::try_from(n).map(NodeId))
            .transpose()
            .map_err(|e| corrupt("skill", id, e))?,
    })
}

type ClusterRow = (i64, Vec<u8>, String, String, String, i64);

fn cluster_row(row: &Row<'_>) -> rusqlite::Result<ClusterRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn decode_cluster(
    (id, fp, name, description, members, explore_count): ClusterRow,
) -> Result<SkillCluster> {
    Ok(SkillCluster {
        id: ClusterId(id),
        fingerprint: Fingerprint::from_bytes(&fp)
            .ok_or_else(|| corrupt("cluster", id, "bad fingerprint blob"))?,
        name,
        description,
        members: serde_json::from_str(&members).map_err(|e| corrupt("cluster", id, e))?,
        explore_count: u32::try_from(explore_count).map_err(|e| corrupt("cluster", id, e))?,
    })
}

impl MemoryStore {
    /// Open or create the database file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// In-memory database, for tests and dry runs
    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    // ------------------------------------------------------------------
    // States
    // ------------------------------------------------------------------

    pub fn insert_state(
        &self,
        fingerprint: &Fingerprint,
        tree: &SearchTree,
        screenshot: Option<&Screen>,
    ) -> Result<State> {
        let screenshot = screenshot.map(encode_png).transpose()?;
        self.conn.execute(
            "INSERT INTO states (fingerprint, tree, object_ids, cluster_ids, screenshot)
             VALUES (?1, ?2, '[]', '[]', ?3)",
            params![fingerprint.to_bytes(), tree.to_json()?, screenshot],
        )?;
        let id = StateId(self.conn.last_insert_rowid());
        debug!(state_id = %id, "inserted state");
        Ok(State {
            id,
            fingerprint: fingerprint.clone(),
            tree: tree.clone(),
            object_ids: Vec::new(),
            cluster_ids: Vec::new(),
        })
    }

    pub fn get_state(&self, id: StateId) -> Result<Option<State>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {} FROM states WHERE id = ?1", STATE_COLUMNS),
                params![id.0],
                state_row,
            )
            .optional()?;
        row.map(decode_state).transpose()
    }

    /// All states in ascending id order
    pub fn list_states(&self) -> Result<Vec<State>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM states ORDER BY id", STATE_COLUMNS))?;
        let rows = stmt.query_map([], state_row)?;
        let mut states = Vec::new();
        for row in rows {
            states.push(decode_state(row?)?);
        }
        Ok(states)
    }

    /// Fingerprints of all states in ascending id order
    pub fn state_fingerprints(&self) -> Result<Vec<(StateId, Fingerprint)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, fingerprint FROM states ORDER BY id")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?)))?;
        let mut out = Vec::new();
        for row in rows {
            let (id, blob) = row?;
            let fp = Fingerprint::from_bytes(&blob)
                .ok_or_else(|| corrupt("state", id, "bad fingerprint blob"))?;
            out.push((StateId(id), fp));
        }
        Ok(out)
    }

    /// Persist tree, object ids and cluster ids of a state
    pub fn update_state(&self, state: &State) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE states SET tree = ?1, object_ids = ?2, cluster_ids = ?3 WHERE id = ?4",
            params![
                state.tree.to_json()?,
                serde_json::to_string(&state.object_ids)?,
                serde_json::to_string(&state.cluster_ids)?,
                state.id.0
            ],
        )?;
        if changed == 0 {
            return Err(AgentError::StateNotFound(state.id));
        }
        Ok(())
    }

    pub fn state_screenshot(&self, id: StateId) -> Result<Option<Screen>> {
        let blob: Option<Option<Vec<u8>>> = self
            .conn
            .query_row(
                "SELECT screenshot FROM states WHERE id = ?1",
                params![id.0],
                |row| row.get(0),
            )
            .optional()?;
        blob.flatten().map(|b| decode_png(&b)).transpose()
    }

    // ------------------------------------------------------------------
    // Objects
    // ------------------------------------------------------------------

    pub fn insert_object(&self, state_id: StateId, object: &DetectedObject) -> Result<ObjectId> {
        self.conn.execute(
            "INSERT INTO objects (state_id, image, hash, area) VALUES (?1, ?2, ?3, ?4)",
            params![
                state_id.0,
                encode_png(&object.image)?,
                object.hash as i64,
                object.area()
            ],
        )?;
        Ok(ObjectId(self.conn.last_insert_rowid()))
    }

    /// Store unmatched objects and record every object id on the state
    ///
    /// Fills in `id` for new objects; the state row is updated in place.
    pub fn save_new_objects(&self, state: &mut State, objects: &mut [DetectedObject]) -> Result<usize> {
        let mut created = 0;
        for object in objects.iter_mut() {
            if object.id.is_none() {
                let id = self.insert_object(state.id, object)?;
                object.id = Some(id);
                state.add_object(id);
                created += 1;
            }
        }
        self.update_state(state)?;
        debug!(state_id = %state.id, created, "saved objects");
        Ok(created)
    }

    pub fn get_objects(&self, ids: &[ObjectId]) -> Result<Vec<ObjectRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT id, state_id, name, image, hash, area FROM objects WHERE id IN ({}) ORDER BY id",
            placeholders(ids.len())
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(ids.iter().map(|i| i.0)), |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Vec<u8>>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, i64>(5)?,
            ))
        })?;
        let mut objects = Vec::new();
        for row in rows {
            let (id, state_id, name, image, hash, area) = row?;
            objects.push(ObjectRecord {
                id: ObjectId(id),
                state_id: StateId(state_id),
                name,
                image: decode_png(&image)?,
                hash: hash as u64,
                area: u32::try_from(area).map_err(|e| corrupt("object", id, e))?,
            });
        }
        Ok(objects)
    }

    pub fn object_image(&self, id: ObjectId) -> Result<Option<Screen>> {
        let blob: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT image FROM objects WHERE id = ?1",
                params![id.0],
                |row| row.get(0),
            )
            .optional()?;
        blob.map(|b| decode_png(&b)).transpose()
    }

    // ------------------------------------------------------------------
    // Skills
    // ------------------------------------------------------------------

    /// Persist a new skill with fitness 0 and one trial
    pub fn insert_skill(&self, skill: &NewSkill) -> Result<Skill> {
        self.conn.execute(
            "INSERT INTO skills (name, description, operations, fitness, trials, state_id, node_id,
                                 image_before, image_after)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                skill.name,
                skill.description,
                serde_json::to_string(&skill.operations)?,
                INITIAL_FITNESS,
                INITIAL_TRIALS,
                skill.state_id.0,
                skill.node_id.0,
                encode_png(&skill.image_before)?,
                encode_png(&skill.image_after)?,
            ],
        )?;
        Ok(Skill {
            id: SkillId(self.conn.last_insert_rowid()),
            name: skill.name.clone(),
            description: skill.description.clone(),
            operations: skill.operations.clone(),
            fitness: INITIAL_FITNESS,
            trials: INITIAL_TRIALS,
            state_id: skill.state_id,
            node_id: Some(skill.node_id),
        })
    }

    pub fn get_skill(&self, id: SkillId) -> Result<Option<Skill>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {} FROM skills WHERE id = ?1", SKILL_COLUMNS),
                params![id.0],
                skill_row,
            )
            .optional()?;
        row.map(decode_skill).transpose()
    }

    /// Skills with the given ids in ascending id order; missing ids are skipped
    pub fn get_skills(&self, ids: &[SkillId]) -> Result<Vec<Skill>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {} FROM skills WHERE id IN ({}) ORDER BY id",
            SKILL_COLUMNS,
            placeholders(ids.len())
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(ids.iter().map(|i| i.0)), skill_row)?;
        let mut skills = Vec::new();
        for row in rows {
            skills.push(decode_skill(row?)?);
        }
        Ok(skills)
    }

    /// All skills, optionally only those of one state
    pub fn list_skills(&self, state: Option<StateId>) -> Result<Vec<Skill>> {
        let mut skills = Vec::new();
        match state {
            Some(state) => {
                let mut stmt = self.conn.prepare(&format!(
                    "SELECT {} FROM skills WHERE state_id = ?1 ORDER BY id",
                    SKILL_COLUMNS
                ))?;
                for row in stmt.query_map(params![state.0], skill_row)? {
                    skills.push(decode_skill(row?)?);
                }
            }
            None => {
                let mut stmt = self
                    .conn
                    .prepare(&format!("SELECT {} FROM skills ORDER BY id", SKILL_COLUMNS))?;
                for row in stmt.query_map([], skill_row)? {
                    skills.push(decode_skill(row?)?);
                }
            }
        }
        Ok(skills)
    }

    pub fn update_skill_evidence(&self, id: SkillId, fitness: i64, trials: u32) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE skills SET fitness = ?1, trials = ?2 WHERE id = ?3",
            params![fitness, trials, id.0],
        )?;
        if changed == 0 {
            return Err(AgentError::SkillNotFound(id));
        }
        Ok(())
    }

    /// Returns whether a row was deleted
    pub fn delete_skill(&self, id: SkillId) -> Result<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM skills WHERE id = ?1", params![id.0])?;
        Ok(changed > 0)
    }

    /// Before/after reference images of a skill
    pub fn skill_images(&self, id: SkillId) -> Result<Option<(Screen, Screen)>> {
        let row: Option<(Option<Vec<u8>>, Option<Vec<u8>>)> = self
            .conn
            .query_row(
                "SELECT image_before, image_after FROM skills WHERE id = ?1",
                params![id.0],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        match row {
            Some((Some(before), Some(after))) => {
                Ok(Some((decode_png(&before)?, decode_png(&after)?)))
            }
            _ => Ok(None),
        }
    }

    // ------------------------------------------------------------------
    // Skill clusters
    // ------------------------------------------------------------------

    /// Persist a new cluster with an explore count of 1
    pub fn insert_cluster(
        &self,
        fingerprint: &Fingerprint,
        name: &str,
        description: &str,
        members: &[SkillId],
    ) -> Result<SkillCluster> {
        let mut unique: Vec<SkillId> = Vec::with_capacity(members.len());
        for m in members {
            if !unique.contains(m) {
                unique.push(*m);
            }
        }
        self.conn.execute(
            "INSERT INTO skill_clusters (fingerprint, name, description, members, explore_count)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                fingerprint.to_bytes(),
                name,
                description,
                serde_json::to_string(&unique)?,
                INITIAL_EXPLORE_COUNT
            ],
        )?;
        Ok(SkillCluster {
            id: ClusterId(self.conn.last_insert_rowid()),
            name: name.to_string(),
            description: description.to_string(),
            members: unique,
            explore_count: INITIAL_EXPLORE_COUNT,
            fingerprint: fingerprint.clone(),
        })
    }

    pub fn get_cluster(&self, id: ClusterId) -> Result<Option<SkillCluster>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {} FROM skill_clusters WHERE id = ?1", CLUSTER_COLUMNS),
                params![id.0],
                cluster_row,
            )
            .optional()?;
        row.map(decode_cluster).transpose()
    }

    /// Clusters with the given ids in ascending id order; missing ids are skipped
    pub fn get_clusters(&self, ids: &[ClusterId]) -> Result<Vec<SkillCluster>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {} FROM skill_clusters WHERE id IN ({}) ORDER BY id",
            CLUSTER_COLUMNS,
            placeholders(ids.len())
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(ids.iter().map(|i| i.0)), cluster_row)?;
        let mut clusters = Vec::new();
        for row in rows {
            clusters.push(decode_cluster(row?)?);
        }
        Ok(clusters)
    }

    pub fn list_clusters(&self) -> Result<Vec<SkillCluster>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM skill_clusters ORDER BY id",
            CLUSTER_COLUMNS
        ))?;
        let rows = stmt.query_map([], cluster_row)?;
        let mut clusters = Vec::new();
        for row in rows {
            clusters.push(decode_cluster(row?)?);
        }
        Ok(clusters)
    }

    /// Persist name, description and members of a cluster
    pub fn update_cluster(&self, cluster: &SkillCluster) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE skill_clusters SET name = ?1, description = ?2, members = ?3 WHERE id = ?4",
            params![
                cluster.name,
                cluster.description,
                serde_json::to_string(&cluster.members)?,
                cluster.id.0
            ],
        )?;
        if changed == 0 {
            return Err(AgentError::ClusterNotFound(cluster.id));
        }
        Ok(())
    }

    pub fn update_cluster_explore_count(&self, id: ClusterId, explore_count: u32) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE skill_clusters SET explore_count = ?1 WHERE id = ?2",
            params![explore_count, id.0],
        )?;
        if changed == 0 {
            return Err(AgentError::ClusterNotFound(id));
        }
        Ok(())
    }

    pub fn delete_cluster(&self, id: ClusterId) -> Result<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM skill_clusters WHERE id = ?1", params![id.0])?;
        Ok(changed > 0)
    }

    // ------------------------------------------------------------------
    // Run metadata
    // ------------------------------------------------------------------

    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row("SELECT value FROM meta WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?)
    }

    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    /// Step counter of the last completed step, if any run has stored one
    pub fn last_step(&self) -> Result<Option<u64>> {
        match self.get_meta(LAST_STEP_KEY)? {
            Some(v) => v
                .parse()
                .map(Some)
                .map_err(|e| AgentError::Corrupt(format!("meta {}: {}", LAST_STEP_KEY, e))),
            None => Ok(None),
        }
    }

    pub fn set_last_step(&self, step: u64) -> Result<()> {
        self.set_meta(LAST_STEP_KEY, &step.to_string())
    }
}
