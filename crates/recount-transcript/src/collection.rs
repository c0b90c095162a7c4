use std::collections::HashSet;

use crate::Result;
use crate::file::TranscriptFile;

/// One session's transcripts: the main log plus zero or more agent sidechain
/// logs, each an independent append-only file.
#[derive(Debug)]
pub struct FileCollection {
    main: TranscriptFile,
    agents: Vec<TranscriptFile>,
    agent_ids: HashSet<String>,
}

impl FileCollection {
    pub fn new(main: TranscriptFile) -> Self {
        Self {
            main,
            agents: Vec::new(),
            agent_ids: HashSet::new(),
        }
    }

    /// Build a collection from raw bytes. Agent entries are `(agent_id,
    /// bytes)` pairs in insertion order. An agent file that yields no typed
    /// lines despite having content is dropped silently; the main transcript
    /// always proceeds.
    pub fn with_agents(
        main_bytes: &[u8],
        agents: impl IntoIterator<Item = (String, Vec<u8>)>,
    ) -> Result<Self> {
        let main = TranscriptFile::from_bytes(main_bytes)?;
        let mut collection = Self::new(main);

        for (agent_id, bytes) in agents {
            if let Ok(file) = TranscriptFile::agent_from_bytes(agent_id.clone(), &bytes) {
                if file.line_count() == 0 && !file.errors.is_empty() {
                    continue; // wholly unparseable agent file
                }
                collection.push_agent(file);
            }
        }

        Ok(collection)
    }

    pub fn push_agent(&mut self, file: TranscriptFile) {
        if let Some(id) = &file.agent_id {
            self.agent_ids.insert(id.clone());
        }
        self.agents.push(file);
    }

    pub fn main(&self) -> &TranscriptFile {
        &self.main
    }

    pub fn agents(&self) -> &[TranscriptFile] {
        &self.agents
    }

    /// Main transcript first, then agents in insertion order.
    pub fn all_files(&self) -> impl Iterator<Item = &TranscriptFile> {
        std::iter::once(&self.main).chain(self.agents.iter())
    }

    /// Whether an agent sidechain file is present for `agent_id`. When it is,
    /// the agent file is authoritative and embedded `toolUseResult` fallbacks
    /// for that agent must not be counted again.
    pub fn has_agent_file(&self, agent_id: &str) -> bool {
        self.agent_ids.contains(agent_id)
    }

    /// Total schema-valid lines across main and agents.
    pub fn total_line_count(&self) -> usize {
        self.all_files().map(|f| f.line_count()).sum()
    }
}

/// Extract the agent id from a sidechain file name:
/// `...agent-<id>.jsonl` -> `<id>`; otherwise the bare file stem.
pub fn agent_id_from_file_name(name: &str) -> String {
    let stem = name.strip_suffix(".jsonl").unwrap_or(name);
    match stem.rfind("agent-") {
        Some(pos) => stem[pos + "agent-".len()..].to_string(),
        None => stem.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAIN: &str = r#"{"type":"user","uuid":"u1","sessionId":"s1","message":{"content":"hi"}}"#;
    const AGENT: &str = r#"{"type":"assistant","uuid":"a1","sessionId":"s1","message":{"id":"m1","model":"x","content":[],"usage":{"input_tokens":1,"output_tokens":2}}}"#;

    #[test]
    fn orders_main_then_agents() {
        let collection = FileCollection::with_agents(
            MAIN.as_bytes(),
            vec![
                ("zz99".to_string(), AGENT.as_bytes().to_vec()),
                ("aa11".to_string(), AGENT.as_bytes().to_vec()),
            ],
        )
        .unwrap();

        let order: Vec<Option<&str>> = collection
            .all_files()
            .map(|f| f.agent_id.as_deref())
            .collect();
        assert_eq!(order, vec![None, Some("zz99"), Some("aa11")]);
        assert_eq!(collection.total_line_count(), 3);
    }

    #[test]
    fn has_agent_file_reflects_loaded_agents() {
        let collection = FileCollection::with_agents(
            MAIN.as_bytes(),
            vec![("ab12".to_string(), AGENT.as_bytes().to_vec())],
        )
        .unwrap();
        assert!(collection.has_agent_file("ab12"));
        assert!(!collection.has_agent_file("cd34"));
    }

    #[test]
    fn unparseable_agent_is_skipped() {
        let collection = FileCollection::with_agents(
            MAIN.as_bytes(),
            vec![("bad".to_string(), b"not json at all".to_vec())],
        )
        .unwrap();
        assert!(!collection.has_agent_file("bad"));
        assert_eq!(collection.agents().len(), 0);
        assert_eq!(collection.total_line_count(), 1);
    }

    #[test]
    fn empty_agent_file_is_kept() {
        let collection = FileCollection::with_agents(
            MAIN.as_bytes(),
            vec![("empty".to_string(), Vec::new())],
        )
        .unwrap();
        assert!(collection.has_agent_file("empty"));
        assert_eq!(collection.total_line_count(), 1);
    }

    #[test]
    fn agent_id_extraction() {
        assert_eq!(
            agent_id_from_file_name("7f2abd2d-agent-be466c0a.jsonl"),
            "be466c0a"
        );
        assert_eq!(agent_id_from_file_name("agent-xyz.jsonl"), "xyz");
        assert_eq!(agent_id_from_file_name("plain.jsonl"), "plain");
        assert_eq!(agent_id_from_file_name("noext"), "noext");
    }
}
