//! Follow-up question suggestions.
//!
//! A static table maps each topic to its trigger keywords and template
//! questions. Matching is a case-insensitive substring scan over the topics
//! in table order; matched topics contribute their templates in order and
//! duplicates across topics are kept.

use serde::{Deserialize, Serialize};

/// Suggestion returned when no topic keyword is present.
pub const FALLBACK_SUGGESTION: &str = "Besoin d'aide pour poser une question ?";

/// Topic bucket of the suggestion table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    /// Diseases, diagnoses and pathology codes.
    Pathology,
    /// Regions, departments and locations.
    Geography,
    /// Years, evolutions and trends.
    Time,
}

/// One row of the suggestion table.
#[derive(Debug)]
pub struct SuggestionTemplate {
    /// Topic of the row.
    pub topic: Topic,
    /// Lowercase trigger keywords.
    pub keywords: &'static [&'static str],
    /// Follow-up questions, in display order.
    pub questions: &'static [&'static str],
}

/// Suggestion table, in matching order.
pub const SUGGESTION_TABLE: &[SuggestionTemplate] = &[
    SuggestionTemplate {
        topic: Topic::Pathology,
        keywords: &["pathologie", "maladie", "diagnostic"],
        questions: &[
            "Quelles pathologies sont les plus fréquentes ?",
            "Évolution des hospitalisations par pathologie ?",
            "Comparaison des régions sur les pathologies.",
        ],
    },
    SuggestionTemplate {
        topic: Topic::Geography,
        keywords: &[
            "région",
            "region",
            "département",
            "departement",
            "localisation",
        ],
        questions: &[
            "Quelles régions ont le plus d'hospitalisations ?",
            "Comparer les régions sur le taux brut.",
            "Top régions selon l'indice standardisé.",
        ],
    },
    SuggestionTemplate {
        topic: Topic::Time,
        keywords: &["année", "annee", "évolution", "evolution", "tendance"],
        questions: &[
            "Tendances des hospitalisations pour l'année spécifiée ?",
            "Comment le taux brut évolue-t-il sur plusieurs années ?",
            "Focus sur une région pour une année spécifique ?",
        ],
    },
];

/// Topics whose keywords appear in `message`, in table order.
#[must_use]
pub fn matched_topics(message: &str) -> Vec<Topic> {
    matching_rows(message).map(|row| row.topic).collect()
}

/// Follow-up questions for the latest user message. Never empty.
#[must_use]
pub fn suggest(last_user_message: &str) -> Vec<String> {
    let suggestions: Vec<String> = matching_rows(last_user_message)
        .flat_map(|row| row.questions.iter().map(|q| (*q).to_string()))
        .collect();

    if suggestions.is_empty() {
        vec![FALLBACK_SUGGESTION.to_string()]
    } else {
        suggestions
    }
}

fn matching_rows(message: &str) -> impl Iterator<Item = &'static SuggestionTemplate> {
    let lowered = message.to_lowercase();
    SUGGESTION_TABLE
        .iter()
        .filter(move |row| row.keywords.iter().any(|keyword| lowered.contains(keyword)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn questions(topic: Topic) -> Vec<String> {
        SUGGESTION_TABLE
            .iter()
            .find(|row| row.topic == topic)
            .map(|row| row.questions.iter().map(|q| (*q).to_string()).collect())
            .unwrap_or_default()
    }

    #[test]
    fn pathology_question_gets_all_pathology_templates() {
        let suggestions = suggest("Quelles pathologies sont les plus fréquentes en 2022 ?");
        for question in questions(Topic::Pathology) {
            assert!(suggestions.contains(&question), "missing {question}");
        }
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert_eq!(
            matched_topics("MALADIE en RÉGION"),
            vec![Topic::Pathology, Topic::Geography]
        );
    }

    #[test]
    fn buckets_keep_table_order_regardless_of_message_order() {
        let suggestions = suggest("tendance par département pour cette maladie");
        let mut expected = questions(Topic::Pathology);
        expected.extend(questions(Topic::Geography));
        expected.extend(questions(Topic::Time));
        assert_eq!(suggestions, expected);
    }

    #[test]
    fn no_keyword_yields_fallback_only() {
        assert_eq!(suggest("merci"), vec![FALLBACK_SUGGESTION.to_string()]);
        assert_eq!(suggest(""), vec![FALLBACK_SUGGESTION.to_string()]);
    }

    #[test]
    fn fallback_iff_no_topic_matched() {
        let samples = [
            "bonjour",
            "diagnostic",
            "Localisation des séjours",
            "Evolution 2018-2022",
            "combien de lits ?",
        ];
        for sample in samples {
            let suggestions = suggest(sample);
            assert!(!suggestions.is_empty());
            let is_fallback = suggestions == vec![FALLBACK_SUGGESTION.to_string()];
            assert_eq!(is_fallback, matched_topics(sample).is_empty(), "{sample}");
        }
    }
}
