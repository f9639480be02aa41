//! Rendering of pending store records.

use plume_store::{CacheKey, DiagramStore, StoreError};

use crate::translator::Translator;

/// Render every pending record of `store` and write the results back.
///
/// Records already rendered (e.g., loaded from a previous build) are not
/// requested again. Returns the number of diagrams sent to the server.
///
/// # Errors
///
/// Returns `StoreError::UnknownKey` if the store lost a key between listing
/// and updating it.
pub fn render_pending(
    store: &mut dyn DiagramStore,
    translator: &Translator,
) -> Result<usize, StoreError> {
    let pending = store.pending();
    if pending.is_empty() {
        tracing::debug!(cached = store.len(), "All diagrams are cached");
        return Ok(0);
    }

    let count = store.count(false);
    tracing::info!(
        light = count.light,
        dark = count.dark,
        cached = store.len() - pending.len(),
        "Rendering diagrams"
    );

    let (keys, schemes): (Vec<CacheKey>, Vec<String>) = pending.into_iter().unzip();
    let results = translator.translate(&schemes);
    let rendered = keys.len();

    store.update_all(keys.into_iter().zip(results).collect())?;
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::encode;
    use plume_config::{CacheConfig, PlantUmlConfig};
    use plume_store::{DiagramRecord, EphemeralStore, ThemeMode, open_store};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn translator(server: &MockServer) -> Translator {
        Translator::new(&PlantUmlConfig::new(server.uri()).with_max_concurrency(4)).unwrap()
    }

    /// Run the blocking pipeline off the async test runtime.
    async fn render(
        mut store: Box<dyn DiagramStore>,
        translator: Translator,
    ) -> (Box<dyn DiagramStore>, usize) {
        tokio::task::spawn_blocking(move || {
            let rendered = render_pending(store.as_mut(), &translator).unwrap();
            (store, rendered)
        })
        .await
        .unwrap()
    }

    async fn ok_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<svg/>"))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_render_pending_updates_store() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/svg/{}", encode("bad"))))
            .respond_with(ResponseTemplate::new(400).set_body_string("Syntax Error?"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<svg><g/></svg>"))
            .mount(&server)
            .await;

        let mut store: Box<dyn DiagramStore> = Box::new(EphemeralStore::new());
        let good = store.add(DiagramRecord::new("good", ThemeMode::Light));
        let dark = store.add(DiagramRecord::new("good", ThemeMode::Dark));
        let bad = store.add(DiagramRecord::new("bad", ThemeMode::Light));

        let (store, rendered) = render(store, translator(&server)).await;

        assert_eq!(rendered, 3);
        assert!(store.pending().is_empty());
        assert!(store.get(&good).unwrap().svg().is_some());
        assert!(store.get(&dark).unwrap().svg().is_some());
        assert_eq!(
            store.get(&bad).unwrap().failure().unwrap().status_code(),
            Some(400)
        );
    }

    #[tokio::test]
    async fn test_render_pending_skips_cached_diagrams() {
        let server = ok_server().await;
        let tmp = tempfile::TempDir::new().unwrap();
        let config = CacheConfig::local(tmp.path().display().to_string());

        // First build renders and persists
        let mut store = open_store(&config).unwrap();
        store.add(DiagramRecord::new("a", ThemeMode::Light));
        let (mut store, rendered) = render(store, translator(&server)).await;
        assert_eq!(rendered, 1);
        store.persist().unwrap();

        // Second build finds the diagram cached
        let mut store = open_store(&config).unwrap();
        let key = store.add(DiagramRecord::new("a", ThemeMode::Light));
        let (store, rendered) = render(store, translator(&server)).await;
        assert_eq!(rendered, 0);
        assert!(store.get(&key).unwrap().svg().is_some());
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_render_pending_empty_store() {
        let server = ok_server().await;
        let store: Box<dyn DiagramStore> = Box::new(EphemeralStore::new());

        let (_, rendered) = render(store, translator(&server)).await;

        assert_eq!(rendered, 0);
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}
