use crate::routes::{chat, health, messages};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(info(
    title = "chat-relay-server",
    description = "Streaming chat relay: persists messages and relays model API replies as server-sent events",
))]
pub struct ApiDoc;

pub fn get_docs() -> utoipa::openapi::OpenApi {
    let mut root = ApiDoc::openapi();
    root.merge(health::HealthApi::openapi());
    root.merge(messages::MessagesApi::openapi());
    root.merge(chat::ChatApi::openapi());
    root
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = get_docs();
        for path in ["/health", "/api/messages", "/api/chat"] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
        let messages = &doc.paths.paths["/api/messages"];
        assert!(messages.get.is_some());
        assert!(messages.delete.is_some());
    }
}
