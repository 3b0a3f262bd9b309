use std::collections::{BTreeSet, HashMap, HashSet};

use crate::error::CoreError;
use crate::hashing;
use crate::playbook::definition::{NodeDefinition, PlaybookDefinition};
use crate::types::DbId;

/// SHA-256 hex checksum of a raw playbook definition.
pub fn checksum(raw: &[u8]) -> String {
    hashing::sha256_hex(raw)
}

struct NodeEntry {
    def: NodeDefinition,
    world: String,
}

/// A validated playbook version.
///
/// Construction checks that node ids are unique, every prerequisite (and
/// `next` pointer) exists, the dependency relation is acyclic and every
/// title has the default locale. Topological order, ancestors and
/// dependents are precomputed, so every query below is a map lookup.
pub struct Catalogue {
    version_id: DbId,
    playbook_id: String,
    version: String,
    locale_default: String,
    worlds: Vec<String>,
    unscored_worlds: HashSet<String>,
    nodes: HashMap<String, NodeEntry>,
    topo: Vec<String>,
    topo_rank: HashMap<String, usize>,
    ancestors: HashMap<String, BTreeSet<String>>,
    dependents: HashMap<String, Vec<String>>,
}

impl std::fmt::Debug for Catalogue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalogue")
            .field("version_id", &self.version_id)
            .field("playbook_id", &self.playbook_id)
            .field("version", &self.version)
            .field("nodes", &self.topo.len())
            .finish()
    }
}

impl Catalogue {
    /// Parse and validate a persisted playbook version.
    pub fn load(version_id: DbId, raw: &[u8]) -> Result<Self, CoreError> {
        let def = PlaybookDefinition::parse(raw)?;
        Self::from_definition(version_id, def)
    }

    pub fn from_definition(version_id: DbId, def: PlaybookDefinition) -> Result<Self, CoreError> {
        let locale = def.locale_default.clone();
        if locale.trim().is_empty() {
            return Err(CoreError::BadCatalogue("locale_default must not be empty".into()));
        }

        let mut nodes: HashMap<String, NodeEntry> = HashMap::new();
        let mut declared: Vec<String> = Vec::new();
        let mut worlds = Vec::with_capacity(def.worlds.len());
        let mut seen_worlds = HashSet::new();
        let mut unscored_worlds = HashSet::new();

        for world in def.worlds {
            if !seen_worlds.insert(world.id.clone()) {
                return Err(CoreError::BadCatalogue(format!("Duplicate world id '{}'", world.id)));
            }
            worlds.push(world.id.clone());
            if !world.scored {
                unscored_worlds.insert(world.id.clone());
            }
            for node in world.nodes {
                validate_titles(&node, &locale)?;
                if nodes.contains_key(&node.id) {
                    return Err(CoreError::BadCatalogue(format!("Duplicate node id '{}'", node.id)));
                }
                declared.push(node.id.clone());
                nodes.insert(
                    node.id.clone(),
                    NodeEntry {
                        def: node,
                        world: world.id.clone(),
                    },
                );
            }
        }

        for id in &declared {
            let entry = &nodes[id];
            for p in entry.def.prerequisites.iter().chain(entry.def.next.iter()) {
                if !nodes.contains_key(p) {
                    return Err(CoreError::BadCatalogue(format!(
                        "Node '{id}' references unknown node '{p}'"
                    )));
                }
            }
            if entry.def.prerequisites.iter().any(|p| p == id) {
                return Err(CoreError::BadCatalogue(format!("Node '{id}' depends on itself")));
            }
        }

        let topo = topological_order(&declared, &nodes)?;
        let topo_rank: HashMap<String, usize> =
            topo.iter().enumerate().map(|(i, id)| (id.clone(), i)).collect();

        let mut ancestors: HashMap<String, BTreeSet<String>> = HashMap::new();
        let mut dependents: HashMap<String, Vec<String>> =
            declared.iter().map(|id| (id.clone(), Vec::new())).collect();
        for id in &topo {
            let mut set = BTreeSet::new();
            for p in &nodes[id].def.prerequisites {
                set.insert(p.clone());
                if let Some(up) = ancestors.get(p) {
                    set.extend(up.iter().cloned());
                }
                if let Some(children) = dependents.get_mut(p) {
                    if !children.contains(id) {
                        children.push(id.clone());
                    }
                }
            }
            ancestors.insert(id.clone(), set);
        }

        Ok(Self {
            version_id,
            playbook_id: def.playbook_id,
            version: def.version,
            locale_default: locale,
            worlds,
            unscored_worlds,
            nodes,
            topo,
            topo_rank,
            ancestors,
            dependents,
        })
    }

    pub fn version_id(&self) -> DbId {
        self.version_id
    }

    pub fn playbook_id(&self) -> &str {
        &self.playbook_id
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn locale_default(&self) -> &str {
        &self.locale_default
    }

    pub fn get(&self, node_id: &str) -> Option<&NodeDefinition> {
        self.nodes.get(node_id).map(|e| &e.def)
    }

    /// Lookup that maps a missing node to `NotFound`.
    pub fn require(&self, node_id: &str) -> Result<&NodeDefinition, CoreError> {
        self.get(node_id).ok_or_else(|| CoreError::not_found("node", node_id))
    }

    pub fn prerequisites(&self, node_id: &str) -> &[String] {
        self.nodes
            .get(node_id)
            .map(|e| e.def.prerequisites.as_slice())
            .unwrap_or(&[])
    }

    pub fn world(&self, node_id: &str) -> Option<&str> {
        self.nodes.get(node_id).map(|e| e.world.as_str())
    }

    /// Transitive prerequisites of `node_id`.
    pub fn ancestors(&self, node_id: &str) -> Option<&BTreeSet<String>> {
        self.ancestors.get(node_id)
    }

    /// Nodes listing `node_id` as a direct prerequisite, in topological order.
    pub fn dependents(&self, node_id: &str) -> &[String] {
        self.dependents.get(node_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn topo_order(&self) -> &[String] {
        &self.topo
    }

    pub fn worlds(&self) -> &[String] {
        &self.worlds
    }

    /// Whether completing `node_id` earns scoreboard XP. Unknown nodes do not.
    pub fn is_scored(&self, node_id: &str) -> bool {
        self.nodes
            .get(node_id)
            .is_some_and(|e| !self.unscored_worlds.contains(&e.world))
    }

    /// Nodes of a world in topological order.
    pub fn nodes_in_world(&self, world: &str) -> Vec<&NodeDefinition> {
        self.topo
            .iter()
            .filter(|id| self.nodes[*id].world == world)
            .map(|id| &self.nodes[id].def)
            .collect()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.topo.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.topo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topo.is_empty()
    }

    /// Sort node ids by topological rank; unknown ids go last by name.
    pub fn sort_topologically(&self, ids: &mut [String]) {
        ids.sort_by(|a, b| {
            let ra = self.topo_rank.get(a).copied().unwrap_or(usize::MAX);
            let rb = self.topo_rank.get(b).copied().unwrap_or(usize::MAX);
            ra.cmp(&rb).then_with(|| a.cmp(b))
        });
    }
}

fn validate_titles(node: &NodeDefinition, locale: &str) -> Result<(), CoreError> {
    if node.id.trim().is_empty() {
        return Err(CoreError::BadCatalogue("Node id must not be empty".into()));
    }
    if !node.title.has(locale) {
        return Err(CoreError::BadCatalogue(format!(
            "Node '{}' has no title for default locale '{locale}'",
            node.id
        )));
    }
    for slot in &node.requirements.uploads {
        if !slot.label.is_empty() && !slot.label.has(locale) {
            return Err(CoreError::BadCatalogue(format!(
                "Upload slot '{}' of node '{}' has no label for default locale '{locale}'",
                slot.key, node.id
            )));
        }
    }
    Ok(())
}

/// Kahn's algorithm; ties are broken by declaration order.
fn topological_order(
    declared: &[String],
    nodes: &HashMap<String, NodeEntry>,
) -> Result<Vec<String>, CoreError> {
    let position: HashMap<&str, usize> = declared
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();
    let mut in_degree: Vec<usize> = declared
        .iter()
        .map(|id| {
            let prereqs: HashSet<&String> = nodes[id].def.prerequisites.iter().collect();
            prereqs.len()
        })
        .collect();
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); declared.len()];
    for (i, id) in declared.iter().enumerate() {
        let prereqs: HashSet<&String> = nodes[id].def.prerequisites.iter().collect();
        for p in prereqs {
            children[position[p.as_str()]].push(i);
        }
    }

    let mut ready: BTreeSet<usize> = (0..declared.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(declared.len());
    while let Some(i) = ready.pop_first() {
        order.push(declared[i].clone());
        for &c in &children[i] {
            in_degree[c] -= 1;
            if in_degree[c] == 0 {
                ready.insert(c);
            }
        }
    }

    if order.len() != declared.len() {
        let mut cyclic: Vec<&str> = declared
            .iter()
            .enumerate()
            .filter(|(i, _)| in_degree[*i] > 0)
            .map(|(_, id)| id.as_str())
            .collect();
        cyclic.sort_unstable();
        return Err(CoreError::BadCatalogue(format!(
            "Prerequisite cycle among nodes: {}",
            cyclic.join(", ")
        )));
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn raw(nodes: &str) -> Vec<u8> {
        format!(
            r#"{{"playbook_id":"pb","version":"v1","locale_default":"en",
                "worlds":[{{"id":"w1","nodes":[{nodes}]}}]}}"#
        )
        .into_bytes()
    }

    fn node(id: &str, prereqs: &[&str]) -> String {
        let p: Vec<String> = prereqs.iter().map(|p| format!("\"{p}\"")).collect();
        format!(
            r#"{{"id":"{id}","type":"form","title":{{"en":"{id}"}},"prerequisites":[{}]}}"#,
            p.join(",")
        )
    }

    #[test]
    fn loads_linear_chain() {
        let nodes = [node("A", &[]), node("B", &["A"]), node("C", &["B"])].join(",");
        let cat = Catalogue::load(DbId::nil(), &raw(&nodes)).unwrap();
        assert_eq!(cat.topo_order(), ["A", "B", "C"]);
        assert_eq!(cat.prerequisites("B"), ["A"]);
        assert_eq!(cat.world("C"), Some("w1"));
        assert_eq!(cat.dependents("A"), ["B"]);
        let anc: Vec<&str> = cat.ancestors("C").unwrap().iter().map(String::as_str).collect();
        assert_eq!(anc, ["A", "B"]);
    }

    #[test]
    fn unscored_worlds_earn_no_xp() {
        let raw = format!(
            r#"{{"playbook_id":"pb","version":"v1","worlds":[
                {{"id":"w1","nodes":[{}]}},
                {{"id":"w3","scored":false,"nodes":[{}]}}]}}"#,
            node("A", &[]),
            node("B", &["A"])
        );
        let cat = Catalogue::load(DbId::nil(), raw.as_bytes()).unwrap();
        assert!(cat.is_scored("A"));
        assert!(!cat.is_scored("B"));
        assert!(!cat.is_scored("ghost"));
    }

    #[test]
    fn topo_order_respects_dependencies_over_declaration() {
        let nodes = [node("B", &["A"]), node("A", &[])].join(",");
        let cat = Catalogue::load(DbId::nil(), &raw(&nodes)).unwrap();
        assert_eq!(cat.topo_order(), ["A", "B"]);
    }

    #[test]
    fn rejects_cycle() {
        let nodes = [node("A", &["C"]), node("B", &["A"]), node("C", &["B"])].join(",");
        let err = Catalogue::load(DbId::nil(), &raw(&nodes)).unwrap_err();
        assert_matches!(err, CoreError::BadCatalogue(msg) if msg.contains("cycle"));
    }

    #[test]
    fn rejects_self_dependency() {
        let nodes = node("A", &["A"]);
        assert_matches!(
            Catalogue::load(DbId::nil(), &raw(&nodes)),
            Err(CoreError::BadCatalogue(_))
        );
    }

    #[test]
    fn rejects_unknown_prerequisite() {
        let nodes = node("A", &["ghost"]);
        let err = Catalogue::load(DbId::nil(), &raw(&nodes)).unwrap_err();
        assert_matches!(err, CoreError::BadCatalogue(msg) if msg.contains("ghost"));
    }

    #[test]
    fn rejects_duplicate_node() {
        let nodes = [node("A", &[]), node("A", &[])].join(",");
        assert_matches!(
            Catalogue::load(DbId::nil(), &raw(&nodes)),
            Err(CoreError::BadCatalogue(_))
        );
    }

    #[test]
    fn rejects_missing_default_locale_title() {
        let nodes = r#"{"id":"A","type":"info","title":{"ru":"А"}}"#;
        let err = Catalogue::load(DbId::nil(), &raw(nodes)).unwrap_err();
        assert_matches!(err, CoreError::BadCatalogue(msg) if msg.contains("default locale"));
    }

    #[test]
    fn rejects_upload_label_without_default_locale() {
        let nodes = r#"{"id":"A","type":"upload","title":{"en":"A"},
            "requirements":{"uploads":[{"key":"cv","required":true,"label":{"ru":"Резюме"}}]}}"#;
        assert_matches!(
            Catalogue::load(DbId::nil(), &raw(nodes)),
            Err(CoreError::BadCatalogue(_))
        );
    }

    #[test]
    fn rejects_malformed_json() {
        assert_matches!(
            Catalogue::load(DbId::nil(), b"{not json"),
            Err(CoreError::BadCatalogue(_))
        );
    }

    #[test]
    fn diamond_ancestors_are_deduplicated() {
        let nodes = [
            node("A", &[]),
            node("B", &["A"]),
            node("C", &["A"]),
            node("D", &["B", "C"]),
        ]
        .join(",");
        let cat = Catalogue::load(DbId::nil(), &raw(&nodes)).unwrap();
        assert_eq!(cat.ancestors("D").unwrap().len(), 3);
        assert_eq!(cat.dependents("A"), ["B", "C"]);
        let mut ids = vec!["D".to_string(), "A".to_string(), "C".to_string()];
        cat.sort_topologically(&mut ids);
        assert_eq!(ids, ["A", "C", "D"]);
    }

    #[test]
    fn checksum_is_stable() {
        let bytes = raw(&node("A", &[]));
        assert_eq!(checksum(&bytes), checksum(&bytes));
    }
}
