//! Error handling for the pharmacy management platform
//!
//! Provides consistent error responses in English and Arabic

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shared::receiving::ReceiptError;
use shared::sales::SaleError;
use shared::stock::StockError;
use shared::UnitError;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation error: {message}")]
    Validation {
        field: String,
        message: String,
        message_ar: String,
    },

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Business logic errors
    #[error("Invalid state: {message}")]
    InvalidState { message: String, message_ar: String },

    #[error("Insufficient stock: {message}")]
    InsufficientStock { message: String, message_ar: String },

    #[error("Barcode {0} belongs to another pharmacy")]
    BarcodeOwnedElsewhere(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Field-level validation failure
    pub fn validation(field: &str, message: impl Into<String>, message_ar: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.to_string(),
            message: message.into(),
            message_ar: message_ar.into(),
        }
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message_en: String,
    pub message_ar: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_detail) = match &self {
            AppError::Validation {
                field,
                message,
                message_ar,
            } => (
                StatusCode::BAD_REQUEST,
                ErrorDetail {
                    code: "VALIDATION_ERROR".to_string(),
                    message_en: message.clone(),
                    message_ar: message_ar.clone(),
                    field: Some(field.clone()),
                },
            ),
            AppError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                ErrorDetail {
                    code: "NOT_FOUND".to_string(),
                    message_en: format!("{} not found", resource),
                    message_ar: format!("لم يتم العثور على {}", resource),
                    field: None,
                },
            ),
            AppError::InvalidState { message, message_ar } => (
                StatusCode::BAD_REQUEST,
                ErrorDetail {
                    code: "INVALID_STATE".to_string(),
                    message_en: message.clone(),
                    message_ar: message_ar.clone(),
                    field: None,
                },
            ),
            AppError::InsufficientStock { message, message_ar } => (
                StatusCode::BAD_REQUEST,
                ErrorDetail {
                    code: "INSUFFICIENT_STOCK".to_string(),
                    message_en: message.clone(),
                    message_ar: message_ar.clone(),
                    field: None,
                },
            ),
            AppError::BarcodeOwnedElsewhere(barcode) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail {
                    code: "BARCODE_OWNED_ELSEWHERE".to_string(),
                    message_en: format!("Barcode {} is registered to another pharmacy", barcode),
                    message_ar: format!("الباركود {} مسجل لصيدلية أخرى", barcode),
                    field: Some("barcode".to_string()),
                },
            ),
            AppError::DatabaseError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail {
                    code: "DATABASE_ERROR".to_string(),
                    message_en: "A database error occurred".to_string(),
                    message_ar: "حدث خطأ في قاعدة البيانات".to_string(),
                    field: None,
                },
            ),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail {
                    code: "INTERNAL_ERROR".to_string(),
                    message_en: msg.clone(),
                    message_ar: "حدث خطأ داخلي في الخادم".to_string(),
                    field: None,
                },
            ),
        };

        // Log the error for debugging
        tracing::error!("Error: {:?}", self);

        (status, Json(ErrorResponse { error: error_detail })).into_response()
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let field = errors
            .field_errors()
            .keys()
            .next()
            .map(|f| f.to_string())
            .unwrap_or_else(|| "body".to_string());
        let message = errors.to_string();
        let message_ar = format!("بيانات غير صالحة في الحقل {}", field);
        AppError::Validation {
            field,
            message,
            message_ar,
        }
    }
}

/// Malformed or mistyped request bodies are validation errors, never defaults
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::validation(
            "body",
            rejection.body_text(),
            "صيغة البيانات المرسلة غير صحيحة",
        )
    }
}

impl From<UnitError> for AppError {
    fn from(err: UnitError) -> Self {
        match err {
            UnitError::ZeroPackagingFactor { field } => AppError::validation(
                field,
                err.to_string(),
                format!("يجب أن يكون {} أكبر من صفر", field),
            ),
            UnitError::Overflow { .. } => AppError::validation(
                "qty",
                err.to_string(),
                "الكمية كبيرة جداً",
            ),
        }
    }
}

impl From<StockError> for AppError {
    fn from(err: StockError) -> Self {
        match err {
            StockError::Insufficient {
                medicine_id,
                available,
                requested,
            } => AppError::InsufficientStock {
                message: err.to_string(),
                message_ar: format!(
                    "المخزون غير كافٍ للصنف {}: المتاح {} والمطلوب {}",
                    medicine_id, available, requested
                ),
            },
            StockError::Overflow { .. } => AppError::Internal(err.to_string()),
        }
    }
}

impl From<ReceiptError> for AppError {
    fn from(err: ReceiptError) -> Self {
        let message = err.to_string();
        match err {
            ReceiptError::OrderNotOpen { status } => AppError::InvalidState {
                message,
                message_ar: format!("لا يمكن استلام أمر شراء حالته {}", status),
            },
            ReceiptError::UnknownLine { purchase_item_id } => AppError::validation(
                "items",
                message,
                format!("الصنف {} غير موجود في أمر الشراء", purchase_item_id),
            ),
            ReceiptError::NegativeQuantity { purchase_item_id } => AppError::validation(
                "items",
                message,
                format!("الكمية المستلمة للصنف {} لا يمكن أن تكون سالبة", purchase_item_id),
            ),
            ReceiptError::QuantityOverflow { purchase_item_id } => AppError::validation(
                "items",
                message,
                format!("الكمية المستلمة للصنف {} كبيرة جداً", purchase_item_id),
            ),
            ReceiptError::ExceedsOutstanding {
                name,
                requested,
                outstanding,
                ..
            } => AppError::validation(
                "items",
                message,
                format!(
                    "لا يمكن استلام {} من \"{}\"، الكمية المتبقية {} فقط",
                    requested, name, outstanding
                ),
            ),
        }
    }
}

impl From<SaleError> for AppError {
    fn from(err: SaleError) -> Self {
        let message = err.to_string();
        match err {
            SaleError::InsufficientStock {
                name,
                available,
                requested,
                ..
            } => AppError::InsufficientStock {
                message,
                message_ar: format!(
                    "المخزون غير كافٍ لـ \"{}\": المتاح {} والمطلوب {}",
                    name, available, requested
                ),
            },
            SaleError::AlreadyReturned => AppError::InvalidState {
                message,
                message_ar: "تم إرجاع هذه الفاتورة من قبل".to_string(),
            },
            SaleError::NotReturnable { .. } => AppError::InvalidState {
                message,
                message_ar: "لا يمكن إرجاع فاتورة غير مرحّلة".to_string(),
            },
            SaleError::NotDraft { .. } => AppError::InvalidState {
                message,
                message_ar: "يمكن ترحيل المسودات فقط".to_string(),
            },
            SaleError::Unit(unit) => unit.into(),
            SaleError::EmptySale => {
                AppError::validation("items", message, "يجب أن تحتوي الفاتورة على صنف واحد على الأقل")
            }
            SaleError::NonPositiveQuantity { medicine_id } => AppError::validation(
                "items",
                message,
                format!("الكمية للصنف {} يجب أن تكون أكبر من صفر", medicine_id),
            ),
            SaleError::NegativePrice { medicine_id } => AppError::validation(
                "items",
                message,
                format!("سعر الصنف {} لا يمكن أن يكون سالباً", medicine_id),
            ),
            SaleError::UnknownMedicine { medicine_id } => AppError::validation(
                "items",
                message,
                format!("الصنف {} غير موجود", medicine_id),
            ),
            SaleError::TotalOverflow => {
                AppError::validation("items", message, "إجمالي الفاتورة كبير جداً")
            }
            SaleError::NonPositivePayment | SaleError::PaymentExceedsTotal { .. } => {
                AppError::validation("payments", message, "مبالغ الدفع غير صحيحة")
            }
            SaleError::UnknownSaleItem { sale_item_id } => AppError::validation(
                "items",
                message,
                format!("البند {} غير موجود في الفاتورة", sale_item_id),
            ),
            SaleError::MedicineNotInSale { medicine_id } => AppError::validation(
                "items",
                message,
                format!("الصنف {} غير موجود في الفاتورة", medicine_id),
            ),
            SaleError::NonPositiveReturn => {
                AppError::validation("items", message, "كمية الإرجاع يجب أن تكون أكبر من صفر")
            }
            SaleError::ReturnExceedsSold {
                requested,
                returnable,
            } => AppError::validation(
                "items",
                message,
                format!(
                    "لا يمكن إرجاع {}، الكمية القابلة للإرجاع {} فقط",
                    requested, returnable
                ),
            ),
            SaleError::NothingToReturn => {
                AppError::validation("items", message, "لا توجد كميات متبقية للإرجاع")
            }
        }
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;
