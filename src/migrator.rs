use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_profiles_table::Migration),
            Box::new(m20240301_000002_create_orders_table::Migration),
            Box::new(m20240301_000003_create_user_discounts_table::Migration),
            Box::new(m20240301_000004_create_referrals_table::Migration),
            Box::new(m20240301_000005_create_catalog_tables::Migration),
            Box::new(m20240301_000006_create_newsletter_subscribers_table::Migration),
        ]
    }
}

mod m20240301_000001_create_profiles_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_profiles_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Profiles::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Profiles::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Profiles::Email).string().not_null().unique_key())
                        .col(ColumnDef::new(Profiles::FullName).string().null())
                        .col(
                            ColumnDef::new(Profiles::IsAdmin)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Profiles::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Profiles::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Profiles {
        Table,
        Id,
        Email,
        FullName,
        IsAdmin,
        CreatedAt,
    }
}

mod m20240301_000002_create_orders_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_orders_table"
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
                        .col(ColumnDef::new(Orders::UserId).uuid().null())
                        .col(ColumnDef::new(Orders::CustomerEmail).string().null())
                        .col(ColumnDef::new(Orders::CustomerName).string().null())
                        .col(ColumnDef::new(Orders::StripeSessionId).string().null())
                        .col(
                            ColumnDef::new(Orders::TotalAmount)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Orders::RefundedAmount)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Orders::Currency)
                                .string_len(3)
                                .not_null()
                                .default("usd"),
                        )
                        .col(ColumnDef::new(Orders::Status).string_len(32).not_null())
                        .col(ColumnDef::new(Orders::PaymentStatus).string_len(32).not_null())
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
                        .name("idx_orders_status")
                        .table(Orders::Table)
                        .col(Orders::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_created_at")
                        .table(Orders::Table)
                        .col(Orders::CreatedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
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
        CustomerEmail,
        CustomerName,
        StripeSessionId,
        TotalAmount,
        RefundedAmount,
        Currency,
        Status,
        PaymentStatus,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000003_create_user_discounts_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000003_create_user_discounts_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(UserDiscounts::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(UserDiscounts::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(UserDiscounts::UserId).uuid().not_null())
                        .col(ColumnDef::new(UserDiscounts::DiscountCode).string().not_null())
                        .col(
                            ColumnDef::new(UserDiscounts::StripeCouponId)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(UserDiscounts::Source).string_len(32).not_null())
                        .col(
                            ColumnDef::new(UserDiscounts::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(UserDiscounts::ExpiresAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(UserDiscounts::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // one code per user; duplicate inserts surface as Conflict
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_user_discounts_user_code")
                        .table(UserDiscounts::Table)
                        .col(UserDiscounts::UserId)
                        .col(UserDiscounts::DiscountCode)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(UserDiscounts::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum UserDiscounts {
        Table,
        Id,
        UserId,
        DiscountCode,
        StripeCouponId,
        Source,
        IsActive,
        ExpiresAt,
        CreatedAt,
    }
}

mod m20240301_000004_create_referrals_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000004_create_referrals_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Referrals::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Referrals::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Referrals::ReferrerId).uuid().not_null())
                        .col(ColumnDef::new(Referrals::RefereeId).uuid().null())
                        .col(ColumnDef::new(Referrals::RefereeEmail).string().null())
                        .col(
                            ColumnDef::new(Referrals::CompletedPurchase)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Referrals::RewardIssued)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(Referrals::RewardType).string_len(32).null())
                        .col(ColumnDef::new(Referrals::RewardValue).big_integer().null())
                        .col(
                            ColumnDef::new(Referrals::RewardIssuedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(Referrals::Notes).text().null())
                        .col(
                            ColumnDef::new(Referrals::CreatedAt)
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
                        .name("idx_referrals_referrer_id")
                        .table(Referrals::Table)
                        .col(Referrals::ReferrerId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Referrals::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Referrals {
        Table,
        Id,
        ReferrerId,
        RefereeId,
        RefereeEmail,
        CompletedPurchase,
        RewardIssued,
        RewardType,
        RewardValue,
        RewardIssuedAt,
        Notes,
        CreatedAt,
    }
}

mod m20240301_000005_create_catalog_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000005_create_catalog_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Products::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(ColumnDef::new(Products::Slug).string().not_null().unique_key())
                        .col(ColumnDef::new(Products::Description).text().null())
                        .col(
                            ColumnDef::new(Products::PriceCents)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Products::StripePriceId).string().null())
                        .col(
                            ColumnDef::new(Products::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Products::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Ingredients::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Ingredients::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Ingredients::Name).string().not_null())
                        .col(ColumnDef::new(Ingredients::Description).text().null())
                        .col(ColumnDef::new(Ingredients::Benefits).text().null())
                        .col(
                            ColumnDef::new(Ingredients::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Ingredients::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Products {
        Table,
        Id,
        Name,
        Slug,
        Description,
        PriceCents,
        StripePriceId,
        IsActive,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum Ingredients {
        Table,
        Id,
        Name,
        Description,
        Benefits,
        CreatedAt,
    }
}

mod m20240301_000006_create_newsletter_subscribers_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000006_create_newsletter_subscribers_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(NewsletterSubscribers::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(NewsletterSubscribers::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(NewsletterSubscribers::Email)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(NewsletterSubscribers::Source).string().null())
                        .col(
                            ColumnDef::new(NewsletterSubscribers::Subscribed)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(NewsletterSubscribers::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(NewsletterSubscribers::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum NewsletterSubscribers {
        Table,
        Id,
        Email,
        Source,
        Subscribed,
        CreatedAt,
    }
}
