use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the trivia live backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::commands::submit_command,
        crate::routes::sessions::get_session,
        crate::routes::sessions::reset_session,
        crate::routes::sessions::get_connections,
        crate::routes::sse::session_stream,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::command::CommandRequest,
            crate::dto::command::CommandPayload,
            crate::dto::command::SongInput,
            crate::dto::command::CommandAck,
            crate::dto::command::CommandStatus,
            crate::dto::session::GameStateView,
            crate::dto::session::SongView,
            crate::dto::session::ConnectionCountsResponse,
            crate::dto::sse::SessionClosedEvent,
            crate::dto::sse::CloseReason,
            crate::dto::ws::ClientMessage,
            crate::dto::ws::ServerMessage,
            crate::error::ErrorBody,
            crate::state::envelope::Role,
            crate::state::envelope::Song,
            crate::state::envelope::Event,
            crate::state::envelope::EventPayload,
            crate::state::phase::Phase,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "commands", description = "Command submission"),
        (name = "sessions", description = "Session snapshots and lifecycle"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "websocket", description = "Bidirectional session sockets"),
    )
)]
pub struct ApiDoc;
