#[derive(Debug, thiserror::Error)]
pub enum ChatServiceError {
    #[error("Invalid instance locator: {0}")]
    InvalidLocator(String),
    #[error("Failed to fetch auth token: {0}")]
    TokenFetchFailed(String),
    #[error("User not found: {0}")]
    UserNotFound(String),
    #[error("Room not found: {0}")]
    RoomNotFound(String),
    #[error("Not connected to the chat service")]
    NotConnected,

    #[error("An unknown error occurred: {0}")]
    Other(anyhow::Error),
}
