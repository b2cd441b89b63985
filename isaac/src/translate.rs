//! Translation backend used when no AI provider is wired in.

use async_trait::async_trait;
use isaac_common::{NaturalLanguageTranslationAdapter, SessionSnapshot, Translation};

/// Refuses every query. Natural-language input then fails closed with a
/// translation failure instead of guessing a command.
#[derive(Debug, Default)]
pub struct UnavailableTranslator;

#[async_trait]
impl NaturalLanguageTranslationAdapter for UnavailableTranslator {
    async fn translate(
        &self,
        _query: &str,
        _shell_name: &str,
        _session: &SessionSnapshot,
    ) -> Translation {
        Translation::failed("no translation backend is configured")
    }
}
