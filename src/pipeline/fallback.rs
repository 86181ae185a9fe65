use super::language::primary_subtag;

/// Returned in place of an empty answer.
pub const FALLBACK_MESSAGE: &str = "I could not produce a complete answer to this question. \
     Could you rephrase it or add some detail?";

/// Language-appropriate fallback message. Unknown languages get English.
pub fn fallback_message_i18n(lang: &str) -> &'static str {
    match primary_subtag(lang).as_str() {
        "fr" => "Je n'ai pas pu formuler une réponse complète à cette question. \
                 Pourriez-vous la reformuler ou ajouter quelques précisions ?",
        "de" => "Ich konnte keine vollständige Antwort auf diese Frage formulieren. \
                 Könnten Sie sie umformulieren oder etwas genauer beschreiben?",
        _ => FALLBACK_MESSAGE,
    }
}
