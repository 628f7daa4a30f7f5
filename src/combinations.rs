use crate::words::WordGroup;
use serde::{Deserialize, Serialize};

/// One fully specified substitution: which target word and which attribute word go into
/// the template, plus the group each came from.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParameterRecord {
    pub target_type: String,
    pub attribute_type: String,
    pub target_word_name: String,
    pub target_word: String,
    pub attribute_word_name: String,
    pub attribute_word: String,
}

/// Full cross product of target groups and attribute groups.
///
/// Order is target group, then attribute group, then target word, then attribute word,
/// each following input order. Duplicate words are not collapsed.
pub fn generate_parameter_combinations(
    target_type: &str,
    attribute_type: &str,
    target_groups: &[WordGroup],
    attribute_groups: &[WordGroup],
) -> Vec<ParameterRecord> {
    let capacity = crate::words::total_words(target_groups)
        * crate::words::total_words(attribute_groups);
    let mut combinations = Vec::with_capacity(capacity);

    for target_group in target_groups {
        for attribute_group in attribute_groups {
            for target_word in &target_group.words {
                for attribute_word in &attribute_group.words {
                    combinations.push(ParameterRecord {
                        target_type: target_type.to_string(),
                        attribute_type: attribute_type.to_string(),
                        target_word_name: target_group.name.clone(),
                        target_word: target_word.clone(),
                        attribute_word_name: attribute_group.name.clone(),
                        attribute_word: attribute_word.clone(),
                    });
                }
            }
        }
    }

    combinations
}
