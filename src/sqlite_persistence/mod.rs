mod versioned_schema;

pub use versioned_schema::{
    create_or_validate, Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema,
    BASE_DB_VERSION,
};
