//! Input-file naming and resolution.
//!
//! File names are a contract with the upstream production jobs:
//!
//! ```text
//! <base>/<category>/<MC>_<collision>_<syst>_<algo>_<jets>_eta<cut>.root           (sum, MC)
//! <base>/<category>/<dir>/<MC>_<dir>_<syst>_<algo>_<jets>_eta<cut>.root           (split, MC)
//! <base>/<category>/<trigger>_<collision>[_<syst>]_<algo>_<jets>_eta<cut>.root    (sum, data)
//! <base>/<category>/<dir>/<trigger>_<dir>[_<syst>]_<algo>_<jets>_eta<cut>.root    (split, data)
//! ```

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable overriding the default data directory.
pub const DATA_DIR_ENV: &str = "JETANA_DATA_DIR";

/// Sample category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Category {
    /// Embedded simulation (`oEmbedding` files).
    Embedding,
    /// Standalone PYTHIA simulation (`oPythia` files).
    Pythia,
    /// Experimental data stored under the given directory name.
    Experimental(String),
}

impl Category {
    /// Parse a category directory name. Anything that is not one of the two
    /// simulation categories is experimental data.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "" => Err(Error::InvalidArgument("category must not be empty".into())),
            "embedding" => Ok(Category::Embedding),
            "pythia" => Ok(Category::Pythia),
            other => Ok(Category::Experimental(other.to_string())),
        }
    }

    /// Directory name below the base path.
    pub fn dir_name(&self) -> &str {
        match self {
            Category::Embedding => "embedding",
            Category::Pythia => "pythia",
            Category::Experimental(name) => name,
        }
    }

    /// Whether this is a simulated sample.
    pub fn is_simulation(&self) -> bool {
        matches!(self, Category::Embedding | Category::Pythia)
    }

    fn file_prefix(&self) -> Option<&'static str> {
        match self {
            Category::Embedding => Some("oEmbedding"),
            Category::Pythia => Some("oPythia"),
            Category::Experimental(_) => None,
        }
    }
}

/// Beam direction split of the sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Proton going in the positive direction.
    #[serde(rename = "pgoing")]
    PGoing,
    /// Lead going in the positive direction.
    #[serde(rename = "Pbgoing")]
    PbGoing,
    /// Both directions combined.
    #[serde(rename = "sum")]
    Sum,
}

impl Direction {
    /// Token used in directory and file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::PGoing => "pgoing",
            Direction::PbGoing => "Pbgoing",
            Direction::Sum => "sum",
        }
    }
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pgoing" => Ok(Direction::PGoing),
            "Pbgoing" => Ok(Direction::PbGoing),
            "sum" => Ok(Direction::Sum),
            other => Err(Error::InvalidArgument(format!(
                "invalid direction '{}'; must be 'pgoing', 'Pbgoing' or 'sum'",
                other
            ))),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed parts of the naming scheme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Root of the analysis data tree.
    pub base_dir: PathBuf,
    /// Collision-system token used for combined-direction files.
    pub collision_tag: String,
    /// Jet-algorithm token.
    pub jet_algo: String,
    /// Systematics token substituted for simulation when none is given.
    pub mc_default_systematics: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        let base_dir = match std::env::var(DATA_DIR_ENV) {
            Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join("cernbox/ana/pPb8160")
            }
        };
        Self {
            base_dir,
            collision_tag: "pPb8160".to_string(),
            jet_algo: "ak4".to_string(),
            mc_default_systematics: "def".to_string(),
        }
    }
}

/// Analysis parameters that select one input file.
#[derive(Debug, Clone, PartialEq)]
pub struct InputSelection<'a> {
    /// Category directory (`embedding`, `pythia`, or a data directory).
    pub category: &'a str,
    /// `pgoing`, `Pbgoing` or `sum`.
    pub direction: &'a str,
    /// Pseudorapidity cut (×10).
    pub eta_cut: i32,
    /// Jet-selection token.
    pub jet_selection: &'a str,
    /// Systematics token.
    pub systematics: Option<&'a str>,
    /// Trigger token; required for experimental data.
    pub trigger: Option<&'a str>,
}

impl Default for InputSelection<'_> {
    fn default() -> Self {
        Self {
            category: "embedding",
            direction: "sum",
            eta_cut: 19,
            jet_selection: "jetId",
            systematics: None,
            trigger: None,
        }
    }
}

/// Maps analysis parameters to input files.
#[derive(Debug, Clone, Default)]
pub struct PathResolver {
    config: ResolverConfig,
}

impl PathResolver {
    /// Create a resolver with the given naming configuration.
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    /// Resolver rooted at `base_dir` with default tokens.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self::new(ResolverConfig { base_dir: base_dir.into(), ..ResolverConfig::default() })
    }

    /// Naming configuration.
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Compose the path for `sel` without touching the file system.
    pub fn compose(&self, sel: &InputSelection<'_>) -> Result<PathBuf> {
        let direction: Direction = sel.direction.parse()?;
        let category = Category::parse(sel.category)?;
        let cfg = &self.config;
        let tail = format!("{}_{}_eta{}.root", cfg.jet_algo, sel.jet_selection, sel.eta_cut);

        let filename = match category.file_prefix() {
            Some(prefix) => {
                let syst = sel.systematics.unwrap_or(&cfg.mc_default_systematics);
                match direction {
                    Direction::Sum => format!("{}_{}_{}_{}", prefix, cfg.collision_tag, syst, tail),
                    d => format!("{d}/{}_{d}_{}_{}", prefix, syst, tail),
                }
            }
            None => {
                let trigger = required_trigger(sel.trigger)?;
                let syst = sel.systematics.map(|s| format!("{}_", s)).unwrap_or_default();
                match direction {
                    Direction::Sum => format!("{}_{}_{}{}", trigger, cfg.collision_tag, syst, tail),
                    d => format!("{d}/{}_{d}_{}{}", trigger, syst, tail),
                }
            }
        };

        Ok(cfg.base_dir.join(category.dir_name()).join(filename))
    }

    /// Compose the path for `sel` and require that the file exists.
    pub fn resolve(&self, sel: &InputSelection<'_>) -> Result<PathBuf> {
        let path = self.compose(sel)?;
        if !path.exists() {
            return Err(Error::NotFound(format!("input file not found: {}", path.display())));
        }
        log::debug!("resolved input {}", path.display());
        Ok(path)
    }
}

fn required_trigger(trigger: Option<&str>) -> Result<&str> {
    match trigger {
        None | Some("") | Some("None") => {
            Err(Error::InvalidArgument("trigger must be specified for experimental data".into()))
        }
        Some(t) => Ok(t),
    }
}

/// Trigger token embedded in a file name, or `"Unknown"`.
pub fn detect_trigger(filename: &str) -> &'static str {
    for token in ["Jet100", "Jet80", "Jet60", "MB"] {
        if filename.contains(token) {
            return token;
        }
    }
    "Unknown"
}

/// Direction encoded in a file name; files without a split token are combined.
pub fn detect_direction(filename: &str) -> Option<Direction> {
    if filename.contains("Pbgoing") {
        Some(Direction::PbGoing)
    } else if filename.contains("pgoing") {
        Some(Direction::PGoing)
    } else {
        None
    }
}

/// Object name with every `-` written as `m` (`hEta-2.5` becomes `hEtam2.5`).
pub fn sanitize_name(name: &str) -> String {
    name.replace('-', "m")
}

/// Name-safe rendering of a numeric range: `-3.0 → "m3_0"`, `120 → "120_0"`.
pub fn fmt_range(low: f64, high: f64) -> (String, String) {
    fn one(x: f64) -> String {
        let s = if x.fract() == 0.0 && x.abs() < 1e15 {
            format!("{:.1}", x)
        } else {
            format!("{}", x)
        };
        let s = s.replace('.', "_");
        match s.strip_prefix('-') {
            Some(rest) => format!("m{}", rest),
            None => s,
        }
    }
    (one(low), one(high))
}

/// Short prefix of a jet-scale histogram name (`hInclusive`, `hLead`, `hSubLead`).
pub fn jes_prefix_from_name(name: &str) -> &'static str {
    if name.starts_with("hInclusive") {
        "hInclusive"
    } else if name.starts_with("hSubLead") {
        "hSubLead"
    } else if name.starts_with("hLead") {
        "hLead"
    } else {
        "hUnknown"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> PathResolver {
        PathResolver::with_base_dir("/data/ana")
    }

    #[test]
    fn embedding_defaults_systematics() {
        let p = resolver().compose(&InputSelection::default()).unwrap();
        assert_eq!(
            p,
            PathBuf::from("/data/ana/embedding/oEmbedding_pPb8160_def_ak4_jetId_eta19.root")
        );
    }

    #[test]
    fn embedding_resolves_existing_file_with_literal_none_trigger() {
        let base = std::env::temp_dir().join(format!("jetana-paths-{}", std::process::id()));
        let file = base.join("embedding/oEmbedding_pPb8160_def_ak4_jetId_eta19.root");
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(&file, b"root").unwrap();

        let sel = InputSelection { trigger: Some("None"), systematics: None, ..InputSelection::default() };
        let resolver = PathResolver::with_base_dir(&base);
        let p = resolver.resolve(&sel).unwrap();
        assert_eq!(p, file);
        assert!(p.file_name().unwrap().to_str().unwrap().contains("_def_"));

        // the same selection on a missing tree is NotFound, not a trigger error
        let err = PathResolver::with_base_dir(base.join("absent")).resolve(&sel).unwrap_err();
        assert!(err.is_not_found(), "got {:?}", err);
        std::fs::remove_dir_all(&base).ok();
    }

    #[test]
    fn pythia_split_direction_uses_subdirectory() {
        let sel = InputSelection {
            category: "pythia",
            direction: "Pbgoing",
            systematics: Some("jerUp"),
            ..InputSelection::default()
        };
        let p = resolver().compose(&sel).unwrap();
        assert_eq!(
            p,
            PathBuf::from("/data/ana/pythia/Pbgoing/oPythia_Pbgoing_jerUp_ak4_jetId_eta19.root")
        );
    }

    #[test]
    fn data_requires_trigger() {
        for trigger in [None, Some("None"), Some("")] {
            let sel = InputSelection { category: "exp_like", trigger, ..InputSelection::default() };
            assert!(matches!(resolver().compose(&sel), Err(Error::InvalidArgument(_))));
        }
    }

    #[test]
    fn data_filenames_with_and_without_systematics() {
        let base = InputSelection {
            category: "MB",
            trigger: Some("Jet60"),
            eta_cut: 16,
            ..InputSelection::default()
        };
        let p = resolver().compose(&base).unwrap();
        assert_eq!(p, PathBuf::from("/data/ana/MB/Jet60_pPb8160_ak4_jetId_eta16.root"));

        let split = InputSelection { direction: "pgoing", systematics: Some("jeuUp"), ..base };
        let p = resolver().compose(&split).unwrap();
        assert_eq!(p, PathBuf::from("/data/ana/MB/pgoing/Jet60_pgoing_jeuUp_ak4_jetId_eta16.root"));
    }

    #[test]
    fn invalid_direction_is_rejected() {
        let sel = InputSelection { direction: "forward", ..InputSelection::default() };
        assert!(matches!(resolver().compose(&sel), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn resolve_fails_fast_on_missing_file() {
        let dir = std::env::temp_dir().join(format!("jetana_paths_{}", std::process::id()));
        let r = PathResolver::with_base_dir(&dir);
        let err = r.resolve(&InputSelection::default()).unwrap_err();
        assert!(err.is_not_found());

        let expected = r.compose(&InputSelection::default()).unwrap();
        std::fs::create_dir_all(expected.parent().unwrap()).unwrap();
        std::fs::write(&expected, b"root").unwrap();
        assert_eq!(r.resolve(&InputSelection::default()).unwrap(), expected);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn filename_detection() {
        assert_eq!(detect_trigger("Jet100_pPb8160_ak4.root"), "Jet100");
        assert_eq!(detect_trigger("MB_pPb8160.root"), "MB");
        assert_eq!(detect_trigger("oPythia.root"), "Unknown");
        assert_eq!(detect_direction("x_Pbgoing_y"), Some(Direction::PbGoing));
        assert_eq!(detect_direction("x_pgoing_y"), Some(Direction::PGoing));
        assert_eq!(detect_direction("x_pPb8160_y"), None);
    }

    #[test]
    fn name_helpers() {
        assert_eq!(sanitize_name("proj_-1.6_0.8"), "proj_m1.6_0.8");
        assert_eq!(sanitize_name("hEta-2.5 to -1"), "hEtam2.5 to m1");
        assert_eq!(fmt_range(-3.0, 0.8), ("m3_0".to_string(), "0_8".to_string()));
        assert_eq!(fmt_range(120.0, -1.6), ("120_0".to_string(), "m1_6".to_string()));
        assert_eq!(jes_prefix_from_name("hLeadJES_pt"), "hLead");
        assert_eq!(jes_prefix_from_name("hSubLeadJES"), "hSubLead");
        assert_eq!(jes_prefix_from_name("hOther"), "hUnknown");
    }
}
