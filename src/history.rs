//! 歴代MVPテーブル用のデータ結合
//!
//! /dataの全レコードからMVP受賞者を抽出し、同チーム・同シーズンの
//! 勝敗を結合する。描画は扱わない。

use crate::api::models::HistoricalRecord;
use crate::api::PredictionApi;

/// チームの勝敗記録
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamRecord {
    pub team: String,
    pub year: i32,
    pub wins: u32,
    pub losses: u32,
}

/// 受賞者1行
#[derive(Debug, Clone, PartialEq)]
pub struct WinnerRow {
    pub player: HistoricalRecord,
    pub record: Option<TeamRecord>,
}

impl WinnerRow {
    /// "13-4" 形式、該当なしは空文字
    pub fn record_text(&self) -> String {
        self.record
            .as_ref()
            .map(|r| format!("{}-{}", r.wins, r.losses))
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoricalTable {
    pub winners: Vec<WinnerRow>,
}

impl HistoricalTable {
    pub fn from_records(records: Vec<HistoricalRecord>) -> Self {
        // 勝敗が欠けている行は結合対象にしない
        let team_records: Vec<TeamRecord> = records
            .iter()
            .filter_map(|r| {
                Some(TeamRecord {
                    team: r.team.clone(),
                    year: r.season,
                    wins: r.wins?,
                    losses: r.losses?,
                })
            })
            .collect();

        let winners = records
            .into_iter()
            .filter(HistoricalRecord::is_mvp)
            .map(|player| {
                let record = team_records
                    .iter()
                    .find(|r| r.team == player.team && r.year == player.season)
                    .cloned();
                WinnerRow { player, record }
            })
            .collect();

        Self { winners }
    }

    /// 取得に失敗した場合は空のテーブル
    pub async fn load(api: &dyn PredictionApi) -> Self {
        match api.fetch_history().await {
            Ok(records) => {
                let table = Self::from_records(records);
                tracing::info!("🏆 Loaded {} past MVP winners", table.winners.len());
                table
            }
            Err(e) => {
                tracing::warn!("⚠️ Failed to load historical data: {}", e);
                Self::default()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.winners.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(
        season: i32,
        last: &str,
        team: &str,
        wins: u32,
        losses: u32,
        mvp: bool,
    ) -> HistoricalRecord {
        HistoricalRecord {
            season,
            name_first: "Test".to_string(),
            name_last: last.to_string(),
            team: team.to_string(),
            wins: Some(wins),
            losses: Some(losses),
            passing_yards: Some(4000.0),
            passing_tds: Some(30.0),
            interceptions: Some(8.0),
            qbr_total: None,
            mvp,
            ..HistoricalRecord::default()
        }
    }

    #[test]
    fn test_winners_are_filtered_in_source_order() {
        let table = HistoricalTable::from_records(vec![
            record(2024, "Allen", "BUF", 13, 4, true),
            record(2024, "Burrow", "CIN", 9, 8, false),
            record(2023, "Jackson", "BAL", 13, 4, true),
        ]);

        assert_eq!(table.winners.len(), 2);
        assert_eq!(table.winners[0].player.name_last, "Allen");
        assert_eq!(table.winners[1].player.name_last, "Jackson");
        assert_eq!(table.winners[0].record_text(), "13-4");
    }

    #[test]
    fn test_record_join_uses_first_match() {
        let winner = record(2022, "Mahomes", "KC", 14, 3, true);
        let duplicate = record(2022, "Backup", "KC", 1, 0, false);

        let table = HistoricalTable::from_records(vec![winner, duplicate]);
        assert_eq!(table.winners[0].record_text(), "14-3");
    }

    #[test]
    fn test_missing_win_loss_leaves_record_blank() {
        let mut winner = record(1998, "Davis", "DEN", 14, 2, true);
        winner.losses = None;

        let table = HistoricalTable::from_records(vec![winner]);
        assert_eq!(table.winners.len(), 1);
        assert_eq!(table.winners[0].record_text(), "");
    }

    #[test]
    fn test_empty_table() {
        let table =
            HistoricalTable::from_records(vec![record(2021, "Nobody", "NYJ", 4, 13, false)]);
        assert!(table.is_empty());

        let row = WinnerRow {
            player: record(2020, "Rodgers", "GB", 13, 3, true),
            record: None,
        };
        assert_eq!(row.record_text(), "");
    }
}
