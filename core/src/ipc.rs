use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use std::sync::Arc;
use crate::columns::{
    insert_note_column, query_order, register_sortable_column, Column, ColumnSwitches, QueryOrder,
};
use crate::config::{ContentTypeChoice, Settings};
use crate::error::{PostNotesError, Result};
use crate::guard::TokenScope;
use crate::host::{Capability, Caller, RequestContext};
use crate::note::ItemId;
use crate::render::ShortcodeAttrs;
use crate::repository::SortOrder;
use crate::request::{BulkEditSave, MetaboxSave, QuickEditSave, RequestParams};
use crate::service::{BulkOutcome, NoteService, SaveOutcome};

const MAX_MESSAGE_SIZE: usize = 1024 * 1024; // 1MB max message size

/// Shown to the host instead of internal storage errors
const STORAGE_FAILURE: &str = "storage unavailable";

/// IPC message types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IpcMessageType {
    GetSettings,
    SaveSettings { caller: Caller, settings: Value },
    ListContentTypes,
    Activate,
    Uninstall,
    IssueToken { caller: Caller, scope: String },
    RenderColumn { item_id: ItemId },
    RenderMetabox { caller: Caller, item_id: ItemId, content_type: String },
    RenderQuickEditField { caller: Caller, column: String, content_type: String },
    RenderShortcode {
        #[serde(default)]
        attributes: String,
        #[serde(default)]
        current_item: Option<ItemId>,
    },
    SaveMetabox { caller: Caller, item_id: ItemId, params: RequestParams },
    SaveQuickEdit { caller: Caller, item_id: ItemId, params: RequestParams },
    SaveBulkEdit { caller: Caller, params: RequestParams },
    ListColumns {
        content_type: String,
        columns: Vec<Column>,
        #[serde(default)]
        sortable: Vec<(String, String)>,
        #[serde(default)]
        switches: ColumnSwitches,
    },
    ListQueryOrder { orderby: String },
    SortItems { item_ids: Vec<ItemId>, #[serde(default)] order: Option<String> },
    ColumnsResponse { columns: Vec<Column>, sortable: Vec<(String, String)> },
    QueryOrderResponse { order: Option<QueryOrder> },
    SettingsResponse { settings: Settings },
    ContentTypesResponse { choices: Vec<ContentTypeChoice> },
    TokenResponse { token: String },
    HtmlResponse { html: String },
    SaveResponse { saved: bool },
    BulkSaveResponse { succeeded: Vec<ItemId>, failed: Vec<ItemId> },
    ItemsResponse { item_ids: Vec<ItemId> },
    Success { message: String },
    Error { message: String },
}

/// IPC message wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcMessage {
    pub id: String,
    #[serde(flatten)]
    pub message_type: IpcMessageType,
}

impl IpcMessage {
    pub fn new(message_type: IpcMessageType) -> Self {
        use chrono::Utc;
        IpcMessage {
            id: format!("{}", Utc::now().timestamp_millis()),
            message_type,
        }
    }

    pub fn with_id(id: String, message_type: IpcMessageType) -> Self {
        IpcMessage { id, message_type }
    }
}

/// IPC server through which the host drives every entry point
pub struct IpcServer {
    service: Arc<NoteService>,
}

impl IpcServer {
    /// Creates a new IPC server
    pub fn new(service: Arc<NoteService>) -> Self {
        IpcServer { service }
    }

    /// Binds `addr` and serves connections until the listener fails
    pub async fn start(&self, addr: &str) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("IPC server listening on {}", addr);
        self.serve(listener).await
    }

    /// Serves connections from an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        loop {
            let (stream, addr) = listener.accept().await?;
            tracing::debug!("New connection from {}", addr);

            let service = Arc::clone(&self.service);

            // Spawn a task to handle each connection
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, service).await {
                    tracing::error!("Error handling connection: {}", e);
                }
            });
        }
    }
}

/// Handles a single client connection
async fn handle_connection(mut stream: TcpStream, service: Arc<NoteService>) -> Result<()> {
    loop {
        let message = match read_message(&mut stream).await {
            Ok(message) => message,
            Err(PostNotesError::ConnectionLost) => {
                tracing::debug!("Client disconnected");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        tracing::debug!("Received message {}", message.id);

        let response = process_message(message, &service);
        send_message(&mut stream, &response).await?;
    }
}

/// Answers one request. Every request gets a response; failures are
/// reported without internal detail.
pub fn process_message(message: IpcMessage, service: &NoteService) -> IpcMessage {
    let response_type = match dispatch(message.message_type, service) {
        Ok(response) => response,
        Err(e) => failure_response(e),
    };

    IpcMessage::with_id(message.id, response_type)
}

fn dispatch(message_type: IpcMessageType, service: &NoteService) -> Result<IpcMessageType> {
    // Settings are read once per request
    let mut config = service.config();

    let response = match message_type {
        IpcMessageType::GetSettings => IpcMessageType::SettingsResponse {
            settings: config.load()?,
        },

        IpcMessageType::SaveSettings { caller, settings } => {
            if !caller.has(Capability::ManageOptions) {
                return Ok(IpcMessageType::Error {
                    message: "not permitted".to_string(),
                });
            }
            config.save(&Settings::coerce(&settings))?;
            IpcMessageType::Success {
                message: "Settings saved".to_string(),
            }
        }

        IpcMessageType::ListContentTypes => IpcMessageType::ContentTypesResponse {
            choices: service.content_type_choices(&config.load()?),
        },

        IpcMessageType::Activate => {
            let installed = config.activate()?;
            IpcMessageType::Success {
                message: if installed {
                    "Default settings installed".to_string()
                } else {
                    "Settings already present".to_string()
                },
            }
        }

        IpcMessageType::Uninstall => {
            config.uninstall()?;
            IpcMessageType::Success {
                message: "Settings removed".to_string(),
            }
        }

        IpcMessageType::IssueToken { caller, scope } => {
            let scope: TokenScope = scope.parse()?;
            IpcMessageType::TokenResponse {
                token: service.issue_token(&caller, &scope)?,
            }
        }

        IpcMessageType::RenderColumn { item_id } => IpcMessageType::HtmlResponse {
            html: service.render_column(item_id)?,
        },

        IpcMessageType::RenderMetabox {
            caller,
            item_id,
            content_type,
        } => IpcMessageType::HtmlResponse {
            html: service.render_metabox(&config.load()?, &caller, item_id, &content_type)?,
        },

        IpcMessageType::RenderQuickEditField {
            caller,
            column,
            content_type,
        } => IpcMessageType::HtmlResponse {
            html: service.render_quick_edit_field(&config.load()?, &caller, &column, &content_type)?,
        },

        IpcMessageType::RenderShortcode {
            attributes,
            current_item,
        } => {
            let mut ctx = RequestContext::new(Caller::anonymous(""));
            ctx.current_item = current_item;
            IpcMessageType::HtmlResponse {
                html: service.render_shortcode(&ctx, &ShortcodeAttrs::parse(&attributes))?,
            }
        }

        IpcMessageType::SaveMetabox {
            caller,
            item_id,
            params,
        } => {
            let req = MetaboxSave::from_params(item_id, &params);
            save_response(service.save_metabox(&config.load()?, &caller, &req))?
        }

        IpcMessageType::SaveQuickEdit {
            caller,
            item_id,
            params,
        } => {
            let req = QuickEditSave::from_params(item_id, &params);
            save_response(service.save_quick_edit(&config.load()?, &caller, &req))?
        }

        IpcMessageType::SaveBulkEdit { caller, params } => {
            let req = BulkEditSave::from_params(&params);
            match service.save_bulk_edit(&config.load()?, &caller, &req) {
                Ok(BulkOutcome::Applied(result)) => IpcMessageType::BulkSaveResponse {
                    failed: result.failed_ids(),
                    succeeded: result.succeeded,
                },
                Ok(BulkOutcome::Skipped(_)) => IpcMessageType::SaveResponse { saved: false },
                Err(e) if !e.is_storage() => IpcMessageType::SaveResponse { saved: false },
                Err(e) => return Err(e),
            }
        }

        IpcMessageType::ListColumns {
            content_type,
            mut columns,
            mut sortable,
            switches,
        } => {
            let settings = config.load()?;
            insert_note_column(&mut columns, &settings, &content_type, &switches);
            register_sortable_column(&mut sortable, &settings, &content_type, &switches);
            IpcMessageType::ColumnsResponse { columns, sortable }
        }

        IpcMessageType::ListQueryOrder { orderby } => IpcMessageType::QueryOrderResponse {
            order: query_order(&orderby),
        },

        IpcMessageType::SortItems { item_ids, order } => IpcMessageType::ItemsResponse {
            item_ids: service
                .repository()
                .sort_by_note(&item_ids, SortOrder::from_param(order.as_deref()))?,
        },

        _ => IpcMessageType::Error {
            message: "Invalid message type".to_string(),
        },
    };

    Ok(response)
}

/// Rejected and skipped saves both read as "not saved"; storage failures
/// are passed on. A skipped bulk edit answers the same way.
fn save_response(result: Result<SaveOutcome>) -> Result<IpcMessageType> {
    match result {
        Ok(SaveOutcome::Saved) => Ok(IpcMessageType::SaveResponse { saved: true }),
        Ok(SaveOutcome::Skipped(_)) => Ok(IpcMessageType::SaveResponse { saved: false }),
        Err(e) if !e.is_storage() => Ok(IpcMessageType::SaveResponse { saved: false }),
        Err(e) => Err(e),
    }
}

fn failure_response(e: PostNotesError) -> IpcMessageType {
    if e.is_storage() {
        tracing::error!("Storage failure: {}", e);
        IpcMessageType::Error {
            message: STORAGE_FAILURE.to_string(),
        }
    } else {
        tracing::debug!("Request failed: {}", e);
        IpcMessageType::Error {
            message: "request rejected".to_string(),
        }
    }
}

/// Reads one length-prefixed message
async fn read_message(stream: &mut TcpStream) -> Result<IpcMessage> {
    // Read message length (4 bytes)
    let mut len_bytes = [0u8; 4];
    match stream.read_exact(&mut len_bytes).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(PostNotesError::ConnectionLost);
        }
        Err(e) => return Err(e.into()),
    }

    let message_len = u32::from_le_bytes(len_bytes) as usize;

    if message_len > MAX_MESSAGE_SIZE {
        return Err(PostNotesError::InvalidMessage);
    }

    // Read the message
    let mut buffer = vec![0; message_len];
    stream.read_exact(&mut buffer).await?;

    serde_json::from_slice(&buffer).map_err(|_| PostNotesError::InvalidMessage)
}

/// Sends a message over the TCP stream
async fn send_message(stream: &mut TcpStream, message: &IpcMessage) -> Result<()> {
    let json = serde_json::to_vec(message)?;
    let len = json.len() as u32;

    // Write message length
    stream.write_all(&len.to_le_bytes()).await?;

    // Write message
    stream.write_all(&json).await?;
    stream.flush().await?;

    Ok(())
}

/// IPC client used by host adapters and tests
pub struct IpcClient {
    stream: TcpStream,
}

impl IpcClient {
    /// Connects to the IPC server
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|_| PostNotesError::ConnectionLost)?;

        Ok(IpcClient { stream })
    }

    /// Sends a message and waits for a response
    pub async fn send_message(&mut self, message: IpcMessage) -> Result<IpcMessage> {
        send_message(&mut self.stream, &message).await?;
        read_message(&mut self.stream).await
    }

    /// Sends a request and returns the response payload
    pub async fn request(&mut self, message_type: IpcMessageType) -> Result<IpcMessageType> {
        let response = self.send_message(IpcMessage::new(message_type)).await?;
        Ok(response.message_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::StaticRegistry;
    use crate::store::{MemoryStore, MetaStore};
    use serde_json::json;

    /// Store whose writes fail; option reads fail too when `options_down`
    struct UnavailableStore {
        options_down: bool,
    }

    impl UnavailableStore {
        fn outage() -> PostNotesError {
            PostNotesError::Storage("connection to db-01:5432 refused".to_string())
        }
    }

    impl MetaStore for UnavailableStore {
        fn get_meta(&self, _item: ItemId, _key: &str) -> Result<Option<String>> {
            Ok(None)
        }

        fn set_meta(&self, _item: ItemId, _key: &str, _value: &str) -> Result<()> {
            Err(Self::outage())
        }

        fn get_option(&self, _name: &str) -> Result<Option<Value>> {
            if self.options_down {
                Err(Self::outage())
            } else {
                Ok(None)
            }
        }

        fn set_option(&self, _name: &str, _value: &Value) -> Result<()> {
            Err(Self::outage())
        }

        fn delete_option(&self, _name: &str) -> Result<()> {
            Err(Self::outage())
        }
    }

    fn unavailable_service(options_down: bool) -> NoteService {
        NoteService::new(
            Arc::new(UnavailableStore { options_down }),
            Arc::new(StaticRegistry::default()),
            b"ipc-secret",
        )
    }

    fn service() -> Arc<NoteService> {
        Arc::new(NoteService::new(
            Arc::new(MemoryStore::new()),
            Arc::new(StaticRegistry::default()),
            b"ipc-secret",
        ))
    }

    fn editor() -> Caller {
        Caller::new("host-session", vec![Capability::EditPosts, Capability::ManageOptions])
    }

    fn params(value: Value) -> RequestParams {
        value.as_object().cloned().unwrap()
    }

    fn item(n: u64) -> ItemId {
        ItemId::new(n).unwrap()
    }

    #[test]
    fn messages_use_flat_json() {
        let message = IpcMessage::with_id(
            "1".to_string(),
            IpcMessageType::RenderColumn { item_id: item(3) },
        );
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value, json!({"id": "1", "type": "RenderColumn", "item_id": 3}));
    }

    #[test]
    fn save_settings_needs_manage_options() {
        let service = service();
        let request = IpcMessage::new(IpcMessageType::SaveSettings {
            caller: Caller::new("s", vec![Capability::EditPosts]),
            settings: json!({"notes_label": "Memo"}),
        });
        let response = process_message(request, &service);
        assert!(matches!(response.message_type, IpcMessageType::Error { .. }));

        let request = IpcMessage::new(IpcMessageType::SaveSettings {
            caller: editor(),
            settings: json!({"post_types": ["post"], "notes_label": "Memo"}),
        });
        let response = process_message(request, &service);
        assert!(matches!(response.message_type, IpcMessageType::Success { .. }));

        let response = process_message(IpcMessage::new(IpcMessageType::GetSettings), &service);
        match response.message_type {
            IpcMessageType::SettingsResponse { settings } => {
                assert_eq!(settings.label, "Memo");
                assert_eq!(settings.enabled_types, vec!["post"]);
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn rejected_save_reads_as_not_saved() {
        let service = service();
        let request = IpcMessage::new(IpcMessageType::SaveMetabox {
            caller: editor(),
            item_id: item(1),
            params: params(json!({"post_type": "post", "spnote": "x", "spnotes_nonce": "bad"})),
        });
        let response = process_message(request, &service);
        assert!(matches!(
            response.message_type,
            IpcMessageType::SaveResponse { saved: false }
        ));
    }

    #[test]
    fn column_wiring_messages() {
        let service = service();
        let request = IpcMessage::new(IpcMessageType::ListColumns {
            content_type: "post".to_string(),
            columns: vec![Column::new("title", "Title"), Column::new("date", "Date")],
            sortable: Vec::new(),
            switches: ColumnSwitches::default(),
        });
        match process_message(request, &service).message_type {
            IpcMessageType::ColumnsResponse { columns, sortable } => {
                let keys: Vec<&str> = columns.iter().map(|c| c.key.as_str()).collect();
                assert_eq!(keys, vec!["title", "spnote", "date"]);
                assert_eq!(sortable, vec![("spnote".to_string(), "spnote".to_string())]);
            }
            other => panic!("unexpected response: {:?}", other),
        }

        let request: IpcMessage = serde_json::from_value(json!({
            "id": "2",
            "type": "ListColumns",
            "content_type": "attachment",
            "columns": [{"key": "title", "header": "Title"}]
        }))
        .unwrap();
        match process_message(request, &service).message_type {
            IpcMessageType::ColumnsResponse { columns, sortable } => {
                assert_eq!(columns, vec![Column::new("title", "Title")]);
                assert!(sortable.is_empty());
            }
            other => panic!("unexpected response: {:?}", other),
        }

        let request = IpcMessage::new(IpcMessageType::ListQueryOrder {
            orderby: "spnote".to_string(),
        });
        assert!(matches!(
            process_message(request, &service).message_type,
            IpcMessageType::QueryOrderResponse { order: Some(_) }
        ));
    }

    #[test]
    fn metabox_for_type_without_notes_is_empty() {
        let service = service();
        let request = IpcMessage::new(IpcMessageType::RenderMetabox {
            caller: editor(),
            item_id: item(5),
            content_type: "attachment".to_string(),
        });
        assert!(matches!(
            process_message(request, &service).message_type,
            IpcMessageType::HtmlResponse { html } if html.is_empty()
        ));
    }

    #[test]
    fn skipped_bulk_edit_reads_as_not_saved() {
        let service = service();
        let token = service.issue_token(&editor(), &TokenScope::Bulk).unwrap();
        let request = IpcMessage::new(IpcMessageType::SaveBulkEdit {
            caller: editor(),
            params: params(json!({"post_ids": [], "spnote": "x", "nonce": token})),
        });
        assert!(matches!(
            process_message(request, &service).message_type,
            IpcMessageType::SaveResponse { saved: false }
        ));
    }

    #[test]
    fn storage_outage_is_reported_without_detail() {
        let service = unavailable_service(true);
        let response = process_message(IpcMessage::new(IpcMessageType::GetSettings), &service);
        match response.message_type {
            IpcMessageType::Error { message } => assert_eq!(message, "storage unavailable"),
            other => panic!("unexpected response: {:?}", other),
        }

        let service = unavailable_service(false);
        let token = service.issue_token(&editor(), &TokenScope::Item(item(1))).unwrap();
        let request = IpcMessage::new(IpcMessageType::SaveMetabox {
            caller: editor(),
            item_id: item(1),
            params: params(json!({"post_type": "post", "spnote": "x", "spnotes_nonce": token})),
        });
        match process_message(request, &service).message_type {
            IpcMessageType::Error { message } => assert_eq!(message, "storage unavailable"),
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn response_keeps_request_id() {
        let service = service();
        let request = IpcMessage::with_id("abc".to_string(), IpcMessageType::Activate);
        let response = process_message(request, &service);
        assert_eq!(response.id, "abc");
    }

    #[tokio::test]
    async fn round_trip_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = IpcServer::new(service());
        tokio::spawn(async move {
            let _ = server.serve(listener).await;
        });

        let mut client = IpcClient::connect(&addr).await.unwrap();

        let token = match client
            .request(IpcMessageType::IssueToken {
                caller: editor(),
                scope: "note:bulk".to_string(),
            })
            .await
            .unwrap()
        {
            IpcMessageType::TokenResponse { token } => token,
            other => panic!("unexpected response: {:?}", other),
        };

        let response = client
            .request(IpcMessageType::SaveBulkEdit {
                caller: editor(),
                params: params(json!({
                    "post_ids": [4, 2],
                    "post_type": "page",
                    "spnote": "shared\nnote",
                    "nonce": token
                })),
            })
            .await
            .unwrap();
        match response {
            IpcMessageType::BulkSaveResponse { succeeded, failed } => {
                assert_eq!(succeeded, vec![item(4), item(2)]);
                assert!(failed.is_empty());
            }
            other => panic!("unexpected response: {:?}", other),
        }

        let response = client
            .request(IpcMessageType::RenderColumn { item_id: item(4) })
            .await
            .unwrap();
        match response {
            IpcMessageType::HtmlResponse { html } => {
                assert_eq!(html, "<div id=\"spnote-4\">shared<br />\nnote</div>")
            }
            other => panic!("unexpected response: {:?}", other),
        }

        let response = client
            .request(IpcMessageType::RenderShortcode {
                attributes: String::new(),
                current_item: Some(item(2)),
            })
            .await
            .unwrap();
        assert!(matches!(response, IpcMessageType::HtmlResponse { html } if html.contains("note-2")));

        let response = client
            .request(IpcMessageType::SortItems {
                item_ids: vec![item(4), item(9), item(2)],
                order: Some("asc".to_string()),
            })
            .await
            .unwrap();
        match response {
            IpcMessageType::ItemsResponse { item_ids } => {
                assert_eq!(item_ids, vec![item(9), item(2), item(4)]);
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }
}
