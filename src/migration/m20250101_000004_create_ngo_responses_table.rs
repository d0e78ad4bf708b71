use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        db.execute_unprepared(
            "CREATE TABLE IF NOT EXISTS ngo_responses (
                id SERIAL PRIMARY KEY,
                complaint_id UUID NOT NULL REFERENCES complaints(id) ON DELETE CASCADE,
                ngo_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                responded_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )",
        )
        .await?;

        // An NGO appears at most once per complaint.
        db.execute_unprepared(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_ngo_responses_complaint_ngo ON ngo_responses(complaint_id, ngo_id)",
        )
        .await?;

        db.execute_unprepared(
            "CREATE INDEX IF NOT EXISTS idx_ngo_responses_ngo_id ON ngo_responses(ngo_id)",
        )
        .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared("DROP TABLE IF EXISTS ngo_responses")
            .await?;
        Ok(())
    }
}
