use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_catalog_tables::Migration),
            Box::new(m20240101_000002_create_addresses_table::Migration),
            Box::new(m20240101_000003_create_cart_items_table::Migration),
            Box::new(m20240101_000004_create_orders_tables::Migration),
            Box::new(m20240101_000005_create_payment_sessions_table::Migration),
        ]
    }
}

#[derive(DeriveIden)]
enum ProductItems {
    Table,
    Id,
    ProductId,
    ProductSizeId,
    Quantity,
    CreatedAt,
    UpdatedAt,
}

mod m20240101_000001_create_catalog_tables {
    use super::ProductItems;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_catalog_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ProductColors::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(ProductColors::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(ProductColors::Value).string().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ProductSizes::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(ProductSizes::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(ProductSizes::Value).string().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Products::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(ColumnDef::new(Products::Description).text().null())
                        .col(ColumnDef::new(Products::Avatar).string().null())
                        .col(
                            ColumnDef::new(Products::Price)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Products::ProductColorId).uuid().null())
                        .col(
                            ColumnDef::new(Products::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_products_product_color_id")
                                .from(Products::Table, Products::ProductColorId)
                                .to(ProductColors::Table, ProductColors::Id)
                                .on_delete(ForeignKeyAction::SetNull),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ProductItems::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(ProductItems::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(ProductItems::ProductId).uuid().not_null())
                        .col(ColumnDef::new(ProductItems::ProductSizeId).uuid().null())
                        // stock on hand can never go negative
                        .col(
                            ColumnDef::new(ProductItems::Quantity)
                                .integer()
                                .not_null()
                                .default(0)
                                .check(Expr::col(ProductItems::Quantity).gte(0)),
                        )
                        .col(
                            ColumnDef::new(ProductItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductItems::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_product_items_product_id")
                                .from(ProductItems::Table, ProductItems::ProductId)
                                .to(Products::Table, Products::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_product_items_product_size_id")
                                .from(ProductItems::Table, ProductItems::ProductSizeId)
                                .to(ProductSizes::Table, ProductSizes::Id)
                                .on_delete(ForeignKeyAction::SetNull),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_product_items_product_id")
                        .table(ProductItems::Table)
                        .col(ProductItems::ProductId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ProductItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(ProductSizes::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(ProductColors::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Products {
        Table,
        Id,
        Name,
        Description,
        Avatar,
        Price,
        ProductColorId,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum ProductColors {
        Table,
        Id,
        Value,
    }

    #[derive(DeriveIden)]
    enum ProductSizes {
        Table,
        Id,
        Value,
    }
}

mod m20240101_000002_create_addresses_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_addresses_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Addresses::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Addresses::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Addresses::UserId).uuid().not_null())
                        .col(ColumnDef::new(Addresses::Province).string().not_null())
                        .col(ColumnDef::new(Addresses::District).string().not_null())
                        .col(ColumnDef::new(Addresses::Ward).string().not_null())
                        .col(ColumnDef::new(Addresses::Specify).string().not_null())
                        .col(ColumnDef::new(Addresses::FullName).string().not_null())
                        .col(ColumnDef::new(Addresses::PhoneNumber).string().not_null())
                        .col(
                            ColumnDef::new(Addresses::IsDefault)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Addresses::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_addresses_user_id")
                        .table(Addresses::Table)
                        .col(Addresses::UserId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Addresses::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Addresses {
        Table,
        Id,
        UserId,
        Province,
        District,
        Ward,
        Specify,
        FullName,
        PhoneNumber,
        IsDefault,
        CreatedAt,
    }
}

mod m20240101_000003_create_cart_items_table {
    use super::ProductItems;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_cart_items_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(CartItems::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(CartItems::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(CartItems::UserId).uuid().not_null())
                        .col(ColumnDef::new(CartItems::ProductItemId).uuid().not_null())
                        .col(
                            ColumnDef::new(CartItems::Quantity)
                                .integer()
                                .not_null()
                                .check(Expr::col(CartItems::Quantity).gte(1)),
                        )
                        .col(
                            ColumnDef::new(CartItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CartItems::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_cart_items_product_item_id")
                                .from(CartItems::Table, CartItems::ProductItemId)
                                .to(ProductItems::Table, ProductItems::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            // one line per (user, product item); the cart upsert targets this index
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_cart_items_user_product_item")
                        .table(CartItems::Table)
                        .col(CartItems::UserId)
                        .col(CartItems::ProductItemId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CartItems::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum CartItems {
        Table,
        Id,
        UserId,
        ProductItemId,
        Quantity,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000004_create_orders_tables {
    use super::ProductItems;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_orders_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Orders::UserId).uuid().not_null())
                        .col(ColumnDef::new(Orders::Address).string().not_null())
                        .col(ColumnDef::new(Orders::FullName).string().not_null())
                        .col(ColumnDef::new(Orders::PhoneNumber).string().not_null())
                        .col(ColumnDef::new(Orders::Specify).string().not_null())
                        .col(ColumnDef::new(Orders::Total).decimal().not_null())
                        .col(
                            ColumnDef::new(Orders::ShippingFee)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Orders::Method).string_len(16).not_null())
                        .col(ColumnDef::new(Orders::Status).string_len(16).not_null())
                        .col(ColumnDef::new(Orders::StatusPay).string_len(16).null())
                        .col(ColumnDef::new(Orders::ReferenceId).string().null())
                        .col(
                            ColumnDef::new(Orders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_user_id")
                        .table(Orders::Table)
                        .col(Orders::UserId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_orders_reference_id")
                        .table(Orders::Table)
                        .col(Orders::ReferenceId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderLines::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(OrderLines::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(OrderLines::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderLines::ProductItemId).uuid().not_null())
                        .col(ColumnDef::new(OrderLines::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(OrderLines::UnitPrice)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderLines::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_lines_order_id")
                                .from(OrderLines::Table, OrderLines::OrderId)
                                .to(Orders::Table, Orders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_lines_product_item_id")
                                .from(OrderLines::Table, OrderLines::ProductItemId)
                                .to(ProductItems::Table, ProductItems::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_lines_order_id")
                        .table(OrderLines::Table)
                        .col(OrderLines::OrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderLines::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Orders {
        Table,
        Id,
        UserId,
        Address,
        FullName,
        PhoneNumber,
        Specify,
        Total,
        ShippingFee,
        Method,
        Status,
        StatusPay,
        ReferenceId,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum OrderLines {
        Table,
        Id,
        OrderId,
        ProductItemId,
        Quantity,
        UnitPrice,
        CreatedAt,
    }
}

mod m20240101_000005_create_payment_sessions_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000005_create_payment_sessions_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PaymentSessions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PaymentSessions::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PaymentSessions::UserId).uuid().not_null())
                        .col(ColumnDef::new(PaymentSessions::ReferenceId).string().not_null())
                        .col(ColumnDef::new(PaymentSessions::SessionId).string().not_null())
                        .col(
                            ColumnDef::new(PaymentSessions::Total)
                                .decimal()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PaymentSessions::Method).string_len(16).not_null())
                        .col(ColumnDef::new(PaymentSessions::Status).string_len(16).not_null())
                        .col(ColumnDef::new(PaymentSessions::LineItems).json().not_null())
                        .col(ColumnDef::new(PaymentSessions::CheckoutUrl).text().null())
                        .col(
                            ColumnDef::new(PaymentSessions::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentSessions::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_payment_sessions_session_id")
                        .table(PaymentSessions::Table)
                        .col(PaymentSessions::SessionId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_payment_sessions_reference_id")
                        .table(PaymentSessions::Table)
                        .col(PaymentSessions::ReferenceId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PaymentSessions::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum PaymentSessions {
        Table,
        Id,
        UserId,
        ReferenceId,
        SessionId,
        Total,
        Method,
        Status,
        LineItems,
        CheckoutUrl,
        CreatedAt,
        UpdatedAt,
    }
}
