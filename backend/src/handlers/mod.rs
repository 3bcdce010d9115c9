pub mod connect;

pub use connect::{
    cancel_request, create_request, end_connection, get_status, list_messages, send_message,
};
