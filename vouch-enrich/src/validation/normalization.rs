//! Skill name normalization
//!
//! Maps spelling variants onto one canonical lowercase name ("golang" → "go",
//! "k8s" → "kubernetes") and assigns a category. Unknown skills keep their
//! cleaned-up name and fall back to the claimed category or `other`.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use crate::types::SkillCategory;

/// Canonical name, category and accepted variants
const SKILL_TABLE: &[(&str, SkillCategory, &[&str])] = &[
    // Programming languages
    ("python", SkillCategory::ProgrammingLanguage, &["py", "python3"]),
    ("javascript", SkillCategory::ProgrammingLanguage, &["js", "ecmascript", "es6"]),
    ("typescript", SkillCategory::ProgrammingLanguage, &["ts"]),
    ("java", SkillCategory::ProgrammingLanguage, &[]),
    ("c++", SkillCategory::ProgrammingLanguage, &["cpp", "cplusplus"]),
    ("c#", SkillCategory::ProgrammingLanguage, &["csharp", "c sharp"]),
    ("c", SkillCategory::ProgrammingLanguage, &[]),
    ("go", SkillCategory::ProgrammingLanguage, &["golang"]),
    ("rust", SkillCategory::ProgrammingLanguage, &["rustlang"]),
    ("ruby", SkillCategory::ProgrammingLanguage, &[]),
    ("php", SkillCategory::ProgrammingLanguage, &[]),
    ("swift", SkillCategory::ProgrammingLanguage, &[]),
    ("kotlin", SkillCategory::ProgrammingLanguage, &[]),
    ("scala", SkillCategory::ProgrammingLanguage, &[]),
    ("r", SkillCategory::ProgrammingLanguage, &["rlang"]),
    ("shell", SkillCategory::ProgrammingLanguage, &["bash", "sh", "shell script", "zsh"]),
    ("sql", SkillCategory::ProgrammingLanguage, &["plsql", "t sql"]),
    ("html", SkillCategory::Frontend, &["html5"]),
    ("css", SkillCategory::Frontend, &["css3", "scss", "sass"]),
    ("dart", SkillCategory::ProgrammingLanguage, &[]),
    ("elixir", SkillCategory::ProgrammingLanguage, &[]),
    ("haskell", SkillCategory::ProgrammingLanguage, &[]),
    ("lua", SkillCategory::ProgrammingLanguage, &[]),
    ("perl", SkillCategory::ProgrammingLanguage, &[]),
    ("objective-c", SkillCategory::ProgrammingLanguage, &["objc", "objective c"]),
    // Frontend
    ("react", SkillCategory::Frontend, &["reactjs", "react.js"]),
    ("vue", SkillCategory::Frontend, &["vuejs", "vue.js"]),
    ("angular", SkillCategory::Frontend, &["angularjs", "angular.js"]),
    ("svelte", SkillCategory::Frontend, &["sveltekit"]),
    ("next.js", SkillCategory::Frontend, &["nextjs"]),
    ("tailwind", SkillCategory::Frontend, &["tailwindcss"]),
    ("redux", SkillCategory::Frontend, &[]),
    ("jquery", SkillCategory::Frontend, &[]),
    // Backend
    ("node.js", SkillCategory::Backend, &["node", "nodejs"]),
    ("django", SkillCategory::Backend, &[]),
    ("flask", SkillCategory::Backend, &[]),
    ("fastapi", SkillCategory::Backend, &[]),
    ("express", SkillCategory::Backend, &["expressjs", "express.js"]),
    ("spring", SkillCategory::Backend, &["spring boot", "springboot"]),
    ("rails", SkillCategory::Backend, &["ruby on rails", "ror"]),
    ("laravel", SkillCategory::Backend, &[]),
    ("graphql", SkillCategory::Backend, &[]),
    ("grpc", SkillCategory::Backend, &[]),
    (".net", SkillCategory::Backend, &["dotnet", "asp.net", "aspnet"]),
    // Databases
    ("postgresql", SkillCategory::Database, &["postgres", "psql"]),
    ("mysql", SkillCategory::Database, &[]),
    ("mongodb", SkillCategory::Database, &["mongo"]),
    ("redis", SkillCategory::Database, &[]),
    ("sqlite", SkillCategory::Database, &["sqlite3"]),
    ("elasticsearch", SkillCategory::Database, &["elastic search"]),
    ("cassandra", SkillCategory::Database, &[]),
    ("dynamodb", SkillCategory::Database, &[]),
    // Cloud
    ("aws", SkillCategory::Cloud, &["amazon web services"]),
    ("gcp", SkillCategory::Cloud, &["google cloud", "google cloud platform"]),
    ("azure", SkillCategory::Cloud, &["microsoft azure"]),
    ("heroku", SkillCategory::Cloud, &[]),
    ("firebase", SkillCategory::Cloud, &[]),
    // DevOps
    ("docker", SkillCategory::Devops, &["dockerfile"]),
    ("kubernetes", SkillCategory::Devops, &["k8s"]),
    ("terraform", SkillCategory::Devops, &["hcl"]),
    ("ansible", SkillCategory::Devops, &[]),
    ("jenkins", SkillCategory::Devops, &[]),
    ("github actions", SkillCategory::Devops, &[]),
    ("ci/cd", SkillCategory::Devops, &["cicd", "ci cd"]),
    ("linux", SkillCategory::Devops, &[]),
    ("nginx", SkillCategory::Devops, &[]),
    ("git", SkillCategory::Devops, &[]),
    // Machine learning
    ("machine learning", SkillCategory::MachineLearning, &["ml"]),
    ("deep learning", SkillCategory::MachineLearning, &["dl"]),
    ("tensorflow", SkillCategory::MachineLearning, &["tf"]),
    ("pytorch", SkillCategory::MachineLearning, &["torch"]),
    ("scikit-learn", SkillCategory::MachineLearning, &["sklearn", "scikit learn"]),
    ("pandas", SkillCategory::MachineLearning, &[]),
    ("numpy", SkillCategory::MachineLearning, &[]),
    ("nlp", SkillCategory::MachineLearning, &["natural language processing"]),
    ("computer vision", SkillCategory::MachineLearning, &[]),
    ("llm", SkillCategory::MachineLearning, &["llms", "large language models"]),
    // Testing
    ("jest", SkillCategory::Testing, &[]),
    ("pytest", SkillCategory::Testing, &[]),
    ("selenium", SkillCategory::Testing, &[]),
    ("cypress", SkillCategory::Testing, &[]),
    ("junit", SkillCategory::Testing, &[]),
    ("playwright", SkillCategory::Testing, &[]),
    ("tdd", SkillCategory::Testing, &["test driven development"]),
];

/// Terms too common in prose to count as a skill mention on their own
const AMBIGUOUS_IN_PROSE: &[&str] = &[
    "c", "r", "go", "sh", "js", "ts", "py", "ml", "dl", "tf", "node", "express", "spring",
    "rails", "swift", "dart", "rust", "git", "torch", "ror", "hcl", "elastic search", "mongo",
];

/// Generic names that say little about what the candidate can do
const VAGUE_SKILLS: &[&str] = &[
    "coding", "programming", "software", "development", "technology", "computer science",
    "it", "web", "mobile", "desktop", "frontend", "backend", "fullstack", "full stack", "data",
    "analytics", "management", "leadership", "communication", "teamwork", "problem solving",
    "critical thinking", "agile", "scrum",
];

/// Specialist skills that should be backed by observed work
const REQUIRES_EVIDENCE: &[&str] = &[
    "machine learning", "deep learning", "artificial intelligence", "ai", "blockchain",
    "cryptocurrency", "quantum computing", "embedded systems", "robotics", "iot",
    "cybersecurity", "penetration testing", "ethical hacking",
];

static SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\s+(?:framework|library|lang|language|programming)$")
        .expect("suffix pattern is valid")
});

/// Variant key → index into SKILL_TABLE
static ALIASES: Lazy<HashMap<String, usize>> = Lazy::new(|| {
    let mut map = HashMap::new();
    for (idx, (canonical, _, variants)) in SKILL_TABLE.iter().enumerate() {
        map.insert(lookup_key(canonical), idx);
        for variant in variants.iter() {
            map.insert(lookup_key(variant), idx);
        }
    }
    map
});

/// Canonical skill name plus category
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedSkill {
    pub name: String,
    pub category: SkillCategory,
    pub known: bool,
}

/// Lowercase, `-`/`_` as spaces, whitespace collapsed, descriptive suffix removed
pub fn lookup_key(raw: &str) -> String {
    let spaced: String = raw
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == '-' || c == '_' { ' ' } else { c })
        .collect();
    let collapsed = spaced.split_whitespace().collect::<Vec<_>>().join(" ");
    SUFFIX.replace(&collapsed, "").into_owned()
}

/// Normalize a raw skill name
///
/// `claimed_category` is used only for skills missing from the table.
pub fn normalize_skill(raw: &str, claimed_category: Option<&str>) -> Option<NormalizedSkill> {
    let key = lookup_key(raw);
    if key.is_empty() {
        return None;
    }

    if let Some(&idx) = ALIASES.get(&key) {
        let (canonical, category, _) = SKILL_TABLE[idx];
        return Some(NormalizedSkill {
            name: canonical.to_string(),
            category,
            known: true,
        });
    }

    Some(NormalizedSkill {
        name: key,
        category: claimed_category
            .map(|c| SkillCategory::parse(&lookup_key(c).replace(' ', "_")))
            .unwrap_or(SkillCategory::Other),
        known: false,
    })
}

/// (term, skill) pairs worth searching for in free text
///
/// Known variants plus `extra` (already normalized) names, minus terms that
/// are ordinary words in prose.
pub fn prose_vocabulary(extra: &[NormalizedSkill]) -> Vec<(String, NormalizedSkill)> {
    let mut terms: Vec<(String, NormalizedSkill)> = ALIASES
        .iter()
        .filter(|(term, _)| !AMBIGUOUS_IN_PROSE.contains(&term.as_str()))
        .map(|(term, &idx)| {
            let (canonical, category, _) = SKILL_TABLE[idx];
            (
                term.clone(),
                NormalizedSkill {
                    name: canonical.to_string(),
                    category,
                    known: true,
                },
            )
        })
        .collect();

    for skill in extra {
        if skill.name.len() >= 3
            && !AMBIGUOUS_IN_PROSE.contains(&skill.name.as_str())
            && !terms.iter().any(|(t, _)| *t == skill.name)
        {
            terms.push((skill.name.clone(), skill.clone()));
        }
    }

    terms.sort_by(|a, b| a.0.cmp(&b.0));
    terms
}

/// True for generic names like "programming" or "teamwork"
pub fn is_vague(name: &str) -> bool {
    VAGUE_SKILLS.contains(&lookup_key(name).as_str())
}

/// True for specialist skills that need observed evidence
pub fn requires_evidence(name: &str) -> bool {
    REQUIRES_EVIDENCE.contains(&lookup_key(name).as_str())
}

/// Whole-term occurrence of `term` in `haystack` (both lookup-key form)
pub fn contains_term(haystack: &str, term: &str) -> bool {
    if term.is_empty() {
        return false;
    }
    haystack.match_indices(term).any(|(start, _)| {
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let after_ok = haystack[start + term.len()..]
            .chars()
            .next()
            .map_or(true, |c| !(c.is_alphanumeric() || c == '+' || c == '#'));
        before_ok && after_ok
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variants_map_to_canonical() {
        assert_eq!(normalize_skill("Golang", None).unwrap().name, "go");
        assert_eq!(normalize_skill("k8s", None).unwrap().name, "kubernetes");
        assert_eq!(normalize_skill("React.js", None).unwrap().name, "react");
        assert_eq!(normalize_skill("Postgres", None).unwrap().name, "postgresql");
        assert_eq!(normalize_skill("C#", None).unwrap().name, "c#");
        assert_eq!(normalize_skill("scikit_learn", None).unwrap().name, "scikit-learn");
    }

    #[test]
    fn test_descriptive_suffix_removed() {
        let skill = normalize_skill("Rust programming", None).unwrap();
        assert_eq!(skill.name, "rust");
        assert_eq!(skill.category, SkillCategory::ProgrammingLanguage);

        assert_eq!(normalize_skill("Django framework", None).unwrap().name, "django");
    }

    #[test]
    fn test_unknown_skill_keeps_name_and_claimed_category() {
        let skill = normalize_skill("  Bevy   Engine ", Some("Game Dev")).unwrap();
        assert_eq!(skill.name, "bevy engine");
        assert_eq!(skill.category, SkillCategory::Other);
        assert!(!skill.known);

        let skill = normalize_skill("Quarkus", Some("backend")).unwrap();
        assert_eq!(skill.category, SkillCategory::Backend);

        assert!(normalize_skill("   ", None).is_none());
    }

    #[test]
    fn test_contains_term_boundaries() {
        assert!(contains_term("built with c++ and rust", "c++"));
        assert!(contains_term("react, vue and svelte", "vue"));
        assert!(!contains_term("reactive streams", "react"));
        assert!(!contains_term("preact apps", "react"));
        assert!(!contains_term("c++ code", "c"));
    }

    #[test]
    fn test_vague_and_specialist_skills() {
        assert!(is_vague("Problem-Solving"));
        assert!(is_vague("teamwork"));
        assert!(!is_vague("rust"));

        let ml = normalize_skill("ML", None).unwrap();
        assert!(requires_evidence(&ml.name));
        assert!(requires_evidence("Embedded_Systems"));
        assert!(!requires_evidence("docker"));
    }

    #[test]
    fn test_prose_vocabulary_skips_ambiguous_terms() {
        let vocab = prose_vocabulary(&[]);
        assert!(vocab.iter().any(|(t, s)| t == "golang" && s.name == "go"));
        assert!(!vocab.iter().any(|(t, _)| t == "go"));
    }
}
