//! Error types for store transport operations

use aws_sdk_dynamodb::error::SdkError;
use aws_sdk_dynamodb::operation::{
    batch_get_item::BatchGetItemError, delete_item::DeleteItemError, get_item::GetItemError,
    put_item::PutItemError, query::QueryError, scan::ScanError, update_item::UpdateItemError,
};
use thiserror::Error;

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Store error types, one per `DynamoDB` operation
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to put user into `DynamoDB`
    #[error("Failed to put user into DynamoDB: {0:?}")]
    DynamoDbPutError(#[from] SdkError<PutItemError>),

    /// Failed to get user from `DynamoDB`
    #[error("Failed to get user from DynamoDB: {0:?}")]
    DynamoDbGetError(#[from] SdkError<GetItemError>),

    /// Failed to scan users from `DynamoDB`
    #[error("Failed to scan users from DynamoDB: {0:?}")]
    DynamoDbScanError(#[from] SdkError<ScanError>),

    /// Failed to query users from `DynamoDB`
    #[error("Failed to query users from DynamoDB: {0:?}")]
    DynamoDbQueryError(#[from] SdkError<QueryError>),

    /// Failed to batch get users from `DynamoDB`
    #[error("Failed to batch get users from DynamoDB: {0:?}")]
    DynamoDbBatchGetError(#[from] SdkError<BatchGetItemError>),

    /// Failed to update user in `DynamoDB`
    #[error("Failed to update user in DynamoDB: {0:?}")]
    DynamoDbUpdateError(#[from] SdkError<UpdateItemError>),

    /// Failed to delete user from `DynamoDB`
    #[error("Failed to delete user from DynamoDB: {0:?}")]
    DynamoDbDeleteError(#[from] SdkError<DeleteItemError>),

    /// Failed to build a request
    #[error("Failed to build request: {0}")]
    Build(String),

    /// Transport failure reported by a non-SDK store
    #[error("Store transport error: {0}")]
    Transport(String),
}

impl StoreError {
    /// Checks if this error represents an upstream (5xx) error
    #[must_use]
    pub fn is_upstream_error(&self) -> bool {
        match self {
            Self::DynamoDbPutError(sdk_err) => Self::check_sdk_error_status(sdk_err),
            Self::DynamoDbGetError(sdk_err) => Self::check_sdk_error_status(sdk_err),
            Self::DynamoDbScanError(sdk_err) => Self::check_sdk_error_status(sdk_err),
            Self::DynamoDbQueryError(sdk_err) => Self::check_sdk_error_status(sdk_err),
            Self::DynamoDbBatchGetError(sdk_err) => Self::check_sdk_error_status(sdk_err),
            Self::DynamoDbUpdateError(sdk_err) => Self::check_sdk_error_status(sdk_err),
            Self::DynamoDbDeleteError(sdk_err) => Self::check_sdk_error_status(sdk_err),
            Self::Build(_) | Self::Transport(_) => false,
        }
    }

    fn check_sdk_error_status<E>(sdk_err: &SdkError<E>) -> bool {
        if let SdkError::ServiceError(err) = sdk_err {
            return err.raw().status().as_u16() >= 500;
        }
        false
    }
}

impl From<aws_sdk_dynamodb::error::BuildError> for StoreError {
    fn from(err: aws_sdk_dynamodb::error::BuildError) -> Self {
        Self::Build(err.to_string())
    }
}
