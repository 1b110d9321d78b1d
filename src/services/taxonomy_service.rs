use std::collections::HashMap;
use std::sync::RwLock;

use tracing::debug;

use crate::error::{Error, Result};
use crate::models::skill::{Skill, SkillId};

/// Append-only skill taxonomy with synonym-aware resolution. Published
/// skills are never renamed or removed, so historical match explanations
/// stay resolvable forever.
pub struct SkillTaxonomy {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    skills: HashMap<SkillId, Skill>,
    /// normalized alias (id, display name or synonym) -> canonical id
    aliases: HashMap<String, SkillId>,
}

impl SkillTaxonomy {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    pub fn with_skills<I>(skills: I) -> Result<Self>
    where
        I: IntoIterator<Item = Skill>,
    {
        let taxonomy = Self::new();
        for skill in skills {
            taxonomy.add_skill(skill)?;
        }
        Ok(taxonomy)
    }

    /// Administrative append. The parent, when declared, must already be
    /// published; alias collisions are rejected so resolution stays
    /// unambiguous.
    pub fn add_skill(&self, skill: Skill) -> Result<()> {
        let mut inner = self.inner.write().map_err(|_| Error::Transient {
            context: "skill taxonomy lock poisoned",
        })?;

        if inner.skills.contains_key(&skill.id) {
            return Err(Error::Config(format!(
                "skill {} is already published",
                skill.id
            )));
        }
        if let Some(parent) = &skill.parent {
            if !inner.skills.contains_key(parent) {
                return Err(Error::Config(format!(
                    "skill {} declares unknown parent {}",
                    skill.id, parent
                )));
            }
        }

        let mut aliases: Vec<String> = Vec::with_capacity(skill.synonyms.len() + 2);
        aliases.push(normalize(skill.id.as_str()));
        aliases.push(normalize(&skill.display_name));
        for synonym in &skill.synonyms {
            aliases.push(normalize(synonym));
        }
        aliases.sort();
        aliases.dedup();

        for alias in &aliases {
            if let Some(existing) = inner.aliases.get(alias) {
                if existing != &skill.id {
                    return Err(Error::Config(format!(
                        "alias '{}' of skill {} already resolves to {}",
                        alias, skill.id, existing
                    )));
                }
            }
        }

        debug!(skill = %skill.id, aliases = aliases.len(), "publishing skill");
        for alias in aliases {
            inner.aliases.insert(alias, skill.id.clone());
        }
        inner.skills.insert(skill.id.clone(), skill);
        Ok(())
    }

    /// Resolve a canonical id or free-text claim to its published skill.
    /// Case- and diacritic-insensitive; fails rather than guesses.
    pub fn resolve(&self, input: &str) -> Result<Skill> {
        let inner = self.read()?;
        let key = normalize(input);
        let id = inner.aliases.get(&key).ok_or_else(|| Error::SkillNotFound {
            input: input.to_string(),
        })?;
        Ok(inner.skills[id].clone())
    }

    pub fn contains(&self, id: &SkillId) -> bool {
        self.read().map(|i| i.skills.contains_key(id)).unwrap_or(false)
    }

    /// True when `candidate` sits somewhere below `ancestor` in the tree.
    pub fn is_descendant(&self, candidate: &SkillId, ancestor: &SkillId) -> bool {
        matches!(self.hops_up(candidate, ancestor), Ok(Some(n)) if n > 0)
    }

    /// Hops along parent links between two skills when one is the other's
    /// ancestor (or they are equal). `None` for unrelated skills: siblings do
    /// not satisfy partial-category matching.
    pub fn taxonomy_distance(&self, a: &SkillId, b: &SkillId) -> Result<Option<u32>> {
        if let Some(up) = self.hops_up(a, b)? {
            return Ok(Some(up));
        }
        self.hops_up(b, a)
    }

    fn hops_up(&self, from: &SkillId, to: &SkillId) -> Result<Option<u32>> {
        let inner = self.read()?;
        let mut current = match inner.skills.get(from) {
            Some(s) => s,
            None => return Ok(None),
        };
        let mut hops = 0u32;
        loop {
            if &current.id == to {
                return Ok(Some(hops));
            }
            match &current.parent {
                Some(parent) => {
                    current = match inner.skills.get(parent) {
                        Some(s) => s,
                        None => return Ok(None),
                    };
                    hops += 1;
                }
                None => return Ok(None),
            }
        }
    }

    pub fn len(&self) -> usize {
        self.read().map(|i| i.skills.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>> {
        self.inner.read().map_err(|_| Error::Transient {
            context: "skill taxonomy lock poisoned",
        })
    }
}

impl Default for SkillTaxonomy {
    fn default() -> Self {
        Self::new()
    }
}

/// Lowercase, strip diacritics common in the deployment region's Latin
/// transliterations, collapse runs of whitespace/punctuation to single
/// spaces. Keeps resolution deterministic without a full Unicode stack.
fn normalize(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_was_space = true;
    for raw in input.chars() {
        for ch in fold_diacritic(raw).unwrap_or(raw).to_lowercase() {
            if ch.is_alphanumeric() {
                out.push(ch);
                last_was_space = false;
            } else if !last_was_space {
                out.push(' ');
                last_was_space = true;
            }
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

fn fold_diacritic(ch: char) -> Option<char> {
    match ch {
        'á' | 'à' | 'â' | 'ä' | 'ã' | 'å' | 'Á' | 'À' | 'Â' | 'Ä' | 'Ã' | 'Å' => Some('a'),
        'é' | 'è' | 'ê' | 'ë' | 'É' | 'È' | 'Ê' | 'Ë' => Some('e'),
        'í' | 'ì' | 'î' | 'ï' | 'Í' | 'Ì' | 'Î' | 'Ï' => Some('i'),
        'ó' | 'ò' | 'ô' | 'ö' | 'õ' | 'Ó' | 'Ò' | 'Ô' | 'Ö' | 'Õ' => Some('o'),
        'ú' | 'ù' | 'û' | 'ü' | 'Ú' | 'Ù' | 'Û' | 'Ü' => Some('u'),
        'ñ' | 'Ñ' => Some('n'),
        'ç' | 'Ç' => Some('c'),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trades() -> SkillTaxonomy {
        SkillTaxonomy::with_skills([
            Skill::new("electrical-work", "Electrical Work"),
            Skill::new("residential-wiring", "Residential Electrical Wiring")
                .with_parent("electrical-work")
                .with_synonyms(["house wiring", "домашняя проводка"]),
            Skill::new("plumbing", "Plumbing").with_synonyms(["pipe fitting", "plomería"]),
        ])
        .expect("seed taxonomy")
    }

    #[test]
    fn resolves_id_name_and_synonyms() {
        let tax = trades();
        assert_eq!(tax.resolve("plumbing").unwrap().id, SkillId::new("plumbing"));
        assert_eq!(
            tax.resolve("Pipe Fitting").unwrap().id,
            SkillId::new("plumbing")
        );
        assert_eq!(
            tax.resolve("  Residential   Electrical Wiring ").unwrap().id,
            SkillId::new("residential-wiring")
        );
    }

    #[test]
    fn resolution_is_diacritic_insensitive() {
        let tax = trades();
        assert_eq!(
            tax.resolve("plomeria").unwrap().id,
            SkillId::new("plumbing")
        );
        assert_eq!(tax.resolve("Plomería").unwrap().id, SkillId::new("plumbing"));
    }

    #[test]
    fn unknown_input_fails_instead_of_guessing() {
        let err = trades().resolve("underwater basket weaving").unwrap_err();
        assert!(matches!(err, Error::SkillNotFound { .. }));
    }

    #[test]
    fn distance_walks_parent_links_only() {
        let tax = trades();
        let wiring = SkillId::new("residential-wiring");
        let electrical = SkillId::new("electrical-work");
        let plumbing = SkillId::new("plumbing");

        assert_eq!(tax.taxonomy_distance(&wiring, &electrical).unwrap(), Some(1));
        assert_eq!(tax.taxonomy_distance(&electrical, &wiring).unwrap(), Some(1));
        assert_eq!(tax.taxonomy_distance(&wiring, &wiring).unwrap(), Some(0));
        assert_eq!(tax.taxonomy_distance(&wiring, &plumbing).unwrap(), None);
        assert!(tax.is_descendant(&wiring, &electrical));
        assert!(!tax.is_descendant(&electrical, &wiring));
    }

    #[test]
    fn rejects_unknown_parent_and_alias_collision() {
        let tax = trades();
        let orphan = Skill::new("hvac", "HVAC").with_parent("mechanical-work");
        assert!(matches!(tax.add_skill(orphan), Err(Error::Config(_))));

        let clash = Skill::new("drain-work", "Drain Work").with_synonyms(["pipe fitting"]);
        assert!(matches!(tax.add_skill(clash), Err(Error::Config(_))));
    }
}
