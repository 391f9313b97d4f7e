// MNISTをClassifier(784 -> hidden -> 10)で学習させる
//
// cargo run --example mnist_classifier -- [config.toml] [data dir]
// データが見つからない場合は合成データで代用する

use lamina::backend::ndarray::NdArray;
use lamina::config::TrainConfig;
use lamina::data::collate::collate_batch;
use lamina::data::dataset::Dataset;
use lamina::data::loader::DataLoader;
use lamina::data::mnist::Mnist;
use lamina::data::synthetic::SyntheticDigits;
use lamina::engine::loss::SoftmaxCrossEntropy;
use lamina::engine::model::Classifier;
use lamina::engine::train::{evaluate, train_epoch};
use lamina::logging::init_tracing;
use tracing::{info, warn};

const SAMPLE_SHAPE: [usize; 1] = [784];
const NUM_CLASSES: usize = 10;

fn run<D>(config: &TrainConfig, train: &D, test: &D) -> lamina::Result<()>
where
    D: Dataset<Item = (Vec<f32>, u8)>,
{
    let mut model =
        Classifier::<NdArray>::new(SAMPLE_SHAPE[0], config.hidden_size, NUM_CLASSES, config.seed)?;
    let mut optimizer = config.optimizer.build(&model)?;
    let loss = SoftmaxCrossEntropy;

    let mut train_loader = DataLoader::new(train, config.batch_size, config.shuffle);
    if let Some(seed) = config.seed {
        train_loader = train_loader.with_seed(seed);
    }
    let test_loader = DataLoader::new(test, config.batch_size, false);

    for epoch in 0..config.epochs {
        let batches = train_loader
            .iter()
            .map(|b| collate_batch::<NdArray>(b, &SAMPLE_SHAPE, NUM_CLASSES));
        train_epoch(&mut model, &mut optimizer, &loss, batches, epoch);
    }

    let stats = evaluate(
        &model,
        &loss,
        test_loader
            .iter()
            .map(|b| collate_batch::<NdArray>(b, &SAMPLE_SHAPE, NUM_CLASSES)),
    );
    info!(accuracy = stats.accuracy, loss = stats.loss, "test set");
    Ok(())
}

fn main() -> lamina::Result<()> {
    init_tracing();

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => TrainConfig::load(path)?,
        None => TrainConfig::default(),
    };
    let root = args.next().unwrap_or_else(|| "./data/mnist".to_string());
    info!(?config, root = %root, "starting");

    match (Mnist::new(&root, true), Mnist::new(&root, false)) {
        (Ok(train), Ok(test)) => run(&config, &train, &test),
        (Err(e), _) | (_, Err(e)) => {
            warn!(error = %e, "MNIST not available, falling back to synthetic digits");
            let seed = config.seed.unwrap_or(0);
            let train = SyntheticDigits::new(1000, seed);
            let test = SyntheticDigits::new(200, seed.wrapping_add(1));
            run(&config, &train, &test)
        }
    }
}
