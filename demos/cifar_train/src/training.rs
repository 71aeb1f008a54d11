use crate::Args;
use crate::data::{CifarBatch, CifarBatcher, CifarSplit, load_split};
use burn::data::dataloader::{DataLoaderBuilder, Dataset};
use burn::data::dataset::transform::ShuffledDataset;
use burn::lr_scheduler::cosine::CosineAnnealingLrSchedulerConfig;
use burn::nn::loss::CrossEntropyLossConfig;
use burn::optim::SgdConfig;
use burn::optim::decay::WeightDecayConfig;
use burn::optim::momentum::MomentumConfig;
use burn::prelude::{Backend, Config, Int, Module, Tensor};
use burn::record::CompactRecorder;
use burn::tensor::backend::AutodiffBackend;
use burn::train::metric::{AccuracyMetric, LearningRateMetric, LossMetric};
use burn::train::{ClassificationOutput, LearnerBuilder, TrainOutput, TrainStep, ValidStep};
use cifar_resnet::models::resnet::prefabs::PREFAB_RESNET_MAP;
use cifar_resnet::models::resnet::shortcut::ShortcutPolicy;
use cifar_resnet::models::resnet::{ResNet, ResNetContractConfig};
use std::path::Path;
use std::time::Instant;

#[derive(Module, Debug)]
pub struct Model<B: Backend> {
    pub resnet: ResNet<B>,
}

impl<B: Backend> Model<B> {
    pub fn forward_classification(
        &self,
        images: Tensor<B, 4>,
        targets: Tensor<B, 1, Int>,
    ) -> ClassificationOutput<B> {
        let output = self.resnet.forward(images);

        let loss = CrossEntropyLossConfig::new()
            .init(&output.device())
            .forward(output.clone(), targets.clone());

        ClassificationOutput::new(loss, output, targets)
    }
}

impl<B: AutodiffBackend> TrainStep<CifarBatch<B>, ClassificationOutput<B>> for Model<B> {
    fn step(
        &self,
        batch: CifarBatch<B>,
    ) -> TrainOutput<ClassificationOutput<B>> {
        let item = self.forward_classification(batch.images, batch.targets);
        TrainOutput::new(self, item.loss.backward(), item)
    }
}

impl<B: Backend> ValidStep<CifarBatch<B>, ClassificationOutput<B>> for Model<B> {
    fn step(
        &self,
        batch: CifarBatch<B>,
    ) -> ClassificationOutput<B> {
        self.forward_classification(batch.images, batch.targets)
    }
}

#[derive(Config, Debug)]
pub struct TrainingConfig {
    pub model: ResNetContractConfig,

    #[config(default = 160)]
    pub num_epochs: usize,

    #[config(default = 128)]
    pub batch_size: usize,

    #[config(default = 4)]
    pub num_workers: usize,

    #[config(default = 42)]
    pub seed: u64,

    #[config(default = 0.1)]
    pub learning_rate: f64,

    #[config(default = 0.9)]
    pub momentum: f64,

    #[config(default = 1e-4)]
    pub weight_decay: f32,
}

impl TrainingConfig {
    pub fn from_args(args: &Args) -> anyhow::Result<Self> {
        let mut model = PREFAB_RESNET_MAP.try_lookup(&args.prefab)?.new_config();
        if args.zero_pad_shortcut {
            model = model.with_shortcut(ShortcutPolicy::ZeroPad);
        }
        // Validate the depth before any data is read.
        model.try_to_structure()?;

        Ok(Self::new(model)
            .with_num_epochs(args.num_epochs)
            .with_batch_size(args.batch_size)
            .with_num_workers(args.num_workers)
            .with_seed(args.seed)
            .with_learning_rate(args.learning_rate))
    }
}

fn create_artifact_dir(artifact_dir: &str) {
    // Remove existing artifacts before to get an accurate learner summary
    std::fs::remove_dir_all(artifact_dir).ok();
    std::fs::create_dir_all(artifact_dir).ok();
}

pub fn train<B: AutodiffBackend>(
    args: &Args,
    device: &B::Device,
) -> anyhow::Result<()> {
    let artifact_dir = args.artifact_dir.as_str();
    create_artifact_dir(artifact_dir);

    let config = TrainingConfig::from_args(args)?;
    config.save(format!("{artifact_dir}/config.json"))?;

    B::seed(config.seed);

    let data_dir = Path::new(&args.data_dir);
    let train = load_split(data_dir, CifarSplit::Train)?;
    let valid = load_split(data_dir, CifarSplit::Test)?;
    let train_size = train.len();

    let dataloader_train = DataLoaderBuilder::<B, _, _>::new(CifarBatcher::training())
        .batch_size(config.batch_size)
        .shuffle(config.seed)
        .num_workers(config.num_workers)
        .build(ShuffledDataset::with_seed(train, config.seed));

    let dataloader_valid = DataLoaderBuilder::<B::InnerBackend, _, _>::new(
        CifarBatcher::evaluation(),
    )
    .batch_size(config.batch_size)
    .num_workers(config.num_workers)
    .build(valid);

    let structure = config.model.try_to_structure()?;
    structure.save(format!("{artifact_dir}/structure.json"))?;
    let resnet: ResNet<B> = structure.init(device);
    tracing::info!(summary = ?resnet.summary(), "training model");

    let model = Model { resnet };

    let optimizer = SgdConfig::new()
        .with_momentum(Some(
            MomentumConfig::new()
                .with_momentum(config.momentum)
                .with_dampening(0.0),
        ))
        .with_weight_decay(Some(WeightDecayConfig::new(config.weight_decay)))
        .init();

    let batches_per_epoch = train_size.div_ceil(config.batch_size);
    let lr_scheduler = CosineAnnealingLrSchedulerConfig::new(
        config.learning_rate,
        config.num_epochs * batches_per_epoch,
    )
    .init()
    .map_err(|e| anyhow::anyhow!("Failed to initialize learning rate scheduler: {}", e))?;

    let learner = LearnerBuilder::new(artifact_dir)
        .metric_train_numeric(LossMetric::new())
        .metric_valid_numeric(LossMetric::new())
        .metric_train_numeric(AccuracyMetric::new())
        .metric_valid_numeric(AccuracyMetric::new())
        .metric_train_numeric(LearningRateMetric::new())
        .with_file_checkpointer(CompactRecorder::new())
        .devices(vec![device.clone()])
        .num_epochs(config.num_epochs)
        .summary()
        .build(model, optimizer, lr_scheduler);

    let now = Instant::now();
    let model_trained = learner.fit(dataloader_train, dataloader_valid);
    let elapsed = now.elapsed().as_secs();
    tracing::info!("Training completed in {}m{}s", elapsed / 60, elapsed % 60);

    model_trained
        .resnet
        .save_weights(format!("{artifact_dir}/model"))?;

    Ok(())
}
