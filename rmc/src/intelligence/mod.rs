pub mod contradiction;
pub mod extractor;
pub mod paths;
pub mod relationship;
pub mod traversal;
pub mod utils;

pub use contradiction::{ContradictionCheckResult, ContradictionDetector};
pub use extractor::{build_extractor, EntityExtractor, ModelExtractor, RuleBasedExtractor};
pub use paths::synthesize_paths;
pub use relationship::{
    LexicalClassifier, ModelClassifier, Overlap, RelationBuilder, RelationClassifier, RelationWeights,
};
pub use traversal::{expand, Discovery, Expansion, ExpansionLimits, GraphArena};
