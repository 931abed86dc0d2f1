use asclepius_rust::classifier::{default_loader, ClassificationClient, ClassifierConfig};
use asclepius_rust::error::{AppError, ErrorKind, Result};
use asclepius_rust::news::{NewsClient, NewsQuery};
use asclepius_rust::pipeline::{Notice, Pipeline};
use asclepius_rust::resolver::ImageReference;
use asclepius_rust::store::PredictionStore;
use asclepius_rust::{cli, config, scanner, Classification, PredictionRecord};
use asclepius_common::{diff, format_confidence, Edit};
use clap::Parser;
use cli::{Cli, Commands, HistoryAction};
use config::Config;
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let default = if verbose { "asclepius_rust=debug,info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = Config::load()?;

    match cli.command {
        Commands::Classify { image, save, no_save } => {
            println!("🔬 asclepius - 画像分類\n");

            let mut pipeline = build_pipeline(&config).await?;
            let reference = ImageReference::parse(&image);

            let spinner = spinner(format!("{} を分類中...", reference.file_name()));
            let classified = classify_one(&mut pipeline, reference).await;
            spinner.finish_and_clear();
            print_notices(&mut pipeline);
            let classification = classified?;

            print_classification(&classification);
            if classification.is_empty() {
                println!("\n閾値 {} を超える候補がありません", config.threshold);
                return Ok(());
            }

            let confirmed = if no_save {
                false
            } else if save {
                true
            } else {
                Confirm::new()
                    .with_prompt("この結果を履歴に保存しますか?")
                    .default(false)
                    .interact()
                    .map_err(|e| AppError::Prompt(e.to_string()))?
            };

            if !confirmed {
                pipeline.discard()?;
                println!("保存しませんでした");
                return Ok(());
            }

            let saved = pipeline.confirm_save().await;
            print_notices(&mut pipeline);
            let Some(record) = saved?.applied() else {
                println!("中断されたため保存しませんでした");
                return Ok(());
            };
            println!("✔ 保存しました: {}", record.image_path);
            println!("  ID: {}", record.id);
        }

        Commands::Batch { folder, recursive } => {
            println!("📂 asclepius - 一括分類\n");

            println!("[1/2] 画像をスキャン中...");
            let images = scanner::scan_folder(&folder, recursive)?;
            println!("✔ {}枚の画像を検出\n", images.len());
            if images.is_empty() {
                return Ok(());
            }

            println!("[2/2] 分類中...");
            let mut pipeline = build_pipeline(&config).await?;
            let bar = ProgressBar::new(images.len() as u64);
            bar.set_style(
                ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );

            let mut rows = Vec::with_capacity(images.len());
            for entry in &images {
                bar.set_message(entry.file_name.clone());
                let outcome = classify_one(&mut pipeline, entry.reference()).await;
                pipeline.take_notices();
                pipeline.reset();
                bar.inc(1);

                match outcome {
                    Ok(classification) => rows.push((entry, Ok(classification))),
                    Err(e) if e.kind() == ErrorKind::ModelLoad => {
                        bar.abandon();
                        return Err(e);
                    }
                    Err(e) => rows.push((entry, Err(e))),
                }
            }
            bar.finish_and_clear();

            for (entry, row) in &rows {
                let name = format!("{} ({})", entry.file_name, format_size(entry.size));
                match row {
                    Ok(c) if c.is_empty() => println!("  {}: (候補なし)", name),
                    Ok(c) => println!("  {}: {}", name, c.result_text()),
                    Err(e) => println!("  {}: ⚠ {}", name, e),
                }
            }
            let failed = rows.iter().filter(|(_, r)| r.is_err()).count();
            println!("\n✅ {}件を分類（失敗 {}件）", rows.len() - failed, failed);
        }

        Commands::History { action } => {
            let store = PredictionStore::open(config.history_path()).await?;
            match action {
                HistoryAction::List => {
                    let records = store.list_all().await;
                    if records.is_empty() {
                        println!("履歴はありません");
                    }
                    for (i, record) in records.iter().enumerate() {
                        print_record(i, record);
                    }
                }
                HistoryAction::Delete { id } => {
                    if store.delete_by_id(&id).await? {
                        println!("✔ 削除しました: {}", id);
                    } else {
                        println!("該当する履歴はありません: {}", id);
                    }
                }
                HistoryAction::Snapshot { output } => {
                    let records = store.list_all().await;
                    std::fs::write(&output, serde_json::to_string_pretty(&records)?)?;
                    println!("✔ {}件を書き出しました: {}", records.len(), output.display());
                }
                HistoryAction::Diff { snapshot } => {
                    let content = std::fs::read_to_string(&snapshot)?;
                    let old = PredictionRecord::list_from_json(&content)?;
                    let current = store.list_all().await;

                    let patch = diff(&old, &current);
                    if patch.is_empty() {
                        println!("差分はありません");
                    }
                    for op in patch.ops() {
                        match op {
                            Edit::Remove { index } => println!("- [{}]", index),
                            Edit::Move { from, to } => println!("~ [{}] -> [{}]", from, to),
                            Edit::Insert { index, item } => {
                                println!("+ [{}] {} {}", index, item.id, item.result)
                            }
                            Edit::Change { index, item } => {
                                println!("* [{}] {} {}", index, item.id, item.result)
                            }
                        }
                    }
                    let (r, m, i, c) = patch.counts();
                    println!("\n削除 {} / 移動 {} / 追加 {} / 変更 {}", r, m, i, c);
                }
            }
        }

        Commands::News { query } => {
            let client = NewsClient::from_config(&config)?;
            let spinner = spinner("ニュースを取得中...".to_string());
            let items = match query {
                Some(q) => client.search(&NewsQuery::with_q(q)).await,
                None => client.search_health_news().await,
            };
            spinner.finish_and_clear();

            for item in items? {
                println!("■ {}", item.title);
                if let Some(url) = &item.url {
                    println!("  {}", url);
                }
            }
        }

        Commands::Config { set_news_api_key, show } => {
            let mut config = config;

            if let Some(key) = set_news_api_key {
                config.set_news_api_key(key)?;
                println!("✔ News APIキーを設定しました");
            }

            if show {
                println!("設定: {}", Config::config_path()?.display());
                println!("  モデル: {}", config.asset_dir.join(&config.model_asset).display());
                println!("  閾値: {}", config.threshold);
                println!("  最大件数: {}", config.max_results);
                println!("  入力サイズ: {}px", config.input_size);
                println!("  向き: {}", config.orientation);
                println!("  データ: {}", config.data_dir.display());
                println!("  最大画像サイズ: {} bytes", config.max_image_bytes);
                println!(
                    "  News APIキー: {}",
                    if config.news_api_key.is_some() { "設定済み" } else { "未設定" }
                );
            }
        }
    }

    Ok(())
}

async fn build_pipeline(config: &Config) -> Result<Pipeline> {
    let store = PredictionStore::open(config.history_path()).await?;
    let loader = default_loader(config.labels_path(), config.input_size);
    let classifier = Arc::new(ClassificationClient::new(
        ClassifierConfig::from_config(config),
        loader,
    ));
    Ok(Pipeline::from_config(config, classifier, store))
}

/// 選択から分類まで進める
async fn classify_one(pipeline: &mut Pipeline, reference: ImageReference) -> Result<Classification> {
    pipeline.select_image(Some(reference));
    pipeline.normalize().await?;
    pipeline
        .classify()
        .await?
        .applied()
        .ok_or_else(|| AppError::Inference("request was abandoned".into()))
}

fn format_size(bytes: u64) -> String {
    if bytes >= 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{} KB", bytes.div_ceil(1024))
    }
}

fn spinner(message: String) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

fn print_notices(pipeline: &mut Pipeline) {
    for notice in pipeline.take_notices() {
        match notice {
            Notice::Info(message) => println!("ℹ {}", message),
            Notice::Error { message, .. } => eprintln!("⚠ {}", message),
        }
    }
}

fn print_classification(classification: &Classification) {
    println!("分類結果:");
    for (i, category) in classification.categories().iter().enumerate() {
        println!(
            "  {}. {} ({})",
            i + 1,
            category.label,
            format_confidence(category.confidence)
        );
    }
}

fn print_record(index: usize, record: &PredictionRecord) {
    println!("{:>3}. {}", index + 1, record.result);
    println!("     ID: {}", record.id);
    println!("     画像: {}", record.image_path);
}
