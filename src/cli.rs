use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "asclepius")]
#[command(about = "皮膚病変写真の分類・履歴管理ツール", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 画像を分類し、確認後に履歴へ保存
    Classify {
        /// 画像のパス、file:// URI、またはURL
        #[arg(required = true)]
        image: String,

        /// 確認なしで保存
        #[arg(short = 'y', long, visible_alias = "yes", conflicts_with = "no_save")]
        save: bool,

        /// 保存しない
        #[arg(long)]
        no_save: bool,
    },

    /// フォルダ内の画像をまとめて分類（保存はしない）
    Batch {
        /// 画像フォルダのパス
        #[arg(required = true)]
        folder: PathBuf,

        /// サブフォルダも再帰的にスキャン
        #[arg(short = 'r', long)]
        recursive: bool,
    },

    /// 保存済みの予測履歴
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// 健康ニュースのヘッドラインを表示
    News {
        /// 検索キーワード（省略時は cancer）
        #[arg(short, long)]
        query: Option<String>,
    },

    /// 設定を表示/編集
    Config {
        /// News APIキーを設定
        #[arg(long)]
        set_news_api_key: Option<String>,

        /// 設定を表示
        #[arg(long)]
        show: bool,
    },
}

#[derive(Subcommand)]
pub enum HistoryAction {
    /// 履歴を一覧表示
    List,

    /// 履歴を削除（存在しないIDは無視）
    Delete {
        /// 予測ID
        #[arg(required = true)]
        id: String,
    },

    /// 現在の履歴をJSONに書き出す
    Snapshot {
        /// 出力ファイル
        #[arg(required = true)]
        output: PathBuf,
    },

    /// 書き出した履歴と現在の履歴の差分を表示
    Diff {
        /// `history snapshot` で書き出したJSON
        #[arg(required = true)]
        snapshot: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_classify_with_yes() {
        let cli = Cli::parse_from(["asclepius", "classify", "lesion.jpg", "--yes"]);
        match cli.command {
            Commands::Classify { image, save, no_save } => {
                assert_eq!(image, "lesion.jpg");
                assert!(save);
                assert!(!no_save);
            }
            _ => panic!("expected classify"),
        }
    }

    #[test]
    fn test_save_conflicts_with_no_save() {
        let result = Cli::try_parse_from(["asclepius", "classify", "a.jpg", "--save", "--no-save"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_history_delete() {
        let cli = Cli::parse_from(["asclepius", "history", "delete", "abc"]);
        assert!(matches!(
            cli.command,
            Commands::History {
                action: HistoryAction::Delete { ref id }
            } if id == "abc"
        ));
    }

    #[test]
    fn test_parse_news_query_optional() {
        let cli = Cli::parse_from(["asclepius", "news"]);
        assert!(matches!(cli.command, Commands::News { query: None }));

        let cli = Cli::parse_from(["asclepius", "news", "-q", "melanoma"]);
        assert!(matches!(
            cli.command,
            Commands::News { query: Some(ref q) } if q == "melanoma"
        ));
    }
}
