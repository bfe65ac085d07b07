//! 数字分類モデルの定義
//!
//! レイヤ構成はメタデータの [`ArchitectureConfig`] から組み立てます。
//! 畳み込み・全結合の重みを種類ごとに `Vec` で持ち、実行順は `plan` に記録します。

use anyhow::{bail, Result};
use burn::{
    module::{Ignored, Module},
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        Linear, LinearConfig,
    },
    tensor::{activation, backend::Backend, Tensor},
};

use crate::model::model_metadata::{Activation, ArchitectureConfig, LayerSpec};

/// 実行順に並んだ処理
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LayerStep {
    Conv { index: usize, activation: Activation },
    Pool { index: usize },
    Flatten,
    Dense { index: usize, activation: Activation },
}

/// 数字分類用CNN
///
/// 入力は NCHW `[batch, channels, height, width]`。
/// NHWC のテンソルは [`DigitClassifier::forward_nhwc`] を使う。
#[derive(Module, Debug)]
pub struct DigitClassifier<B: Backend> {
    convs: Vec<Conv2d<B>>,
    pools: Vec<MaxPool2d>,
    denses: Vec<Linear<B>>,
    plan: Ignored<Vec<LayerStep>>,
    num_outputs: usize,
}

/// 組み立て中の形状
#[derive(Debug, Clone, Copy)]
enum FeatureShape {
    Spatial { channels: usize, height: usize, width: usize },
    Flat(usize),
}

/// 順伝播中の値
enum Features<B: Backend> {
    Spatial(Tensor<B, 4>),
    Flat(Tensor<B, 2>),
}

impl<B: Backend> Features<B> {
    fn into_flat(self) -> Tensor<B, 2> {
        match self {
            Features::Spatial(x) => x.flatten::<2>(1, 3),
            Features::Flat(x) => x,
        }
    }
}

impl<B: Backend> DigitClassifier<B> {
    /// レイヤ構成からモデルを初期化（重みはランダム）
    pub fn init(arch: &ArchitectureConfig, device: &B::Device) -> Result<Self> {
        let mut convs = Vec::new();
        let mut pools = Vec::new();
        let mut denses = Vec::new();
        let mut plan = Vec::new();
        let mut shape: Option<FeatureShape> = None;

        for (position, layer) in arch.layers.iter().enumerate() {
            match (layer, shape) {
                (LayerSpec::InputLayer(_), None) => {
                    let Some((height, width, channels)) = arch.input_shape() else {
                        bail!("入力形状が不正です: {:?}", layer);
                    };
                    shape = Some(FeatureShape::Spatial { channels, height, width });
                }
                (LayerSpec::InputLayer(_), Some(_)) => {
                    bail!("InputLayer は先頭にのみ置けます (位置 {})", position);
                }
                (_, None) => bail!("先頭のレイヤが InputLayer ではありません: {}", layer.name()),
                (
                    LayerSpec::Conv2D(c),
                    Some(FeatureShape::Spatial { channels, height, width }),
                ) => {
                    let [kh, kw] = c.kernel_size;
                    if kh == 0 || kw == 0 || kh > height || kw > width || c.filters == 0 {
                        bail!(
                            "{}: カーネル {}x{} / フィルタ {} は入力 {}x{} に適用できません",
                            c.name, kh, kw, c.filters, height, width
                        );
                    }
                    convs.push(
                        Conv2dConfig::new([channels, c.filters], c.kernel_size).init(device),
                    );
                    plan.push(LayerStep::Conv {
                        index: convs.len() - 1,
                        activation: c.activation,
                    });
                    shape = Some(FeatureShape::Spatial {
                        channels: c.filters,
                        height: height - kh + 1,
                        width: width - kw + 1,
                    });
                }
                (
                    LayerSpec::MaxPooling2D(c),
                    Some(FeatureShape::Spatial { channels, height, width }),
                ) => {
                    let [ph, pw] = c.pool_size;
                    if ph == 0 || pw == 0 || ph > height || pw > width {
                        bail!(
                            "{}: プーリング {}x{} は入力 {}x{} に適用できません",
                            c.name, ph, pw, height, width
                        );
                    }
                    pools.push(MaxPool2dConfig::new(c.pool_size).with_strides(c.pool_size).init());
                    plan.push(LayerStep::Pool { index: pools.len() - 1 });
                    shape = Some(FeatureShape::Spatial {
                        channels,
                        height: height / ph,
                        width: width / pw,
                    });
                }
                (
                    LayerSpec::Flatten(_),
                    Some(FeatureShape::Spatial { channels, height, width }),
                ) => {
                    plan.push(LayerStep::Flatten);
                    shape = Some(FeatureShape::Flat(channels * height * width));
                }
                (LayerSpec::Flatten(_), Some(flat @ FeatureShape::Flat(_))) => {
                    shape = Some(flat);
                }
                (LayerSpec::Dense(c), Some(FeatureShape::Flat(features))) => {
                    if c.units == 0 {
                        bail!("{}: units が 0 です", c.name);
                    }
                    denses.push(LinearConfig::new(features, c.units).init(device));
                    plan.push(LayerStep::Dense {
                        index: denses.len() - 1,
                        activation: c.activation,
                    });
                    shape = Some(FeatureShape::Flat(c.units));
                }
                (LayerSpec::Dense(c), Some(FeatureShape::Spatial { .. })) => {
                    bail!("{}: Dense の前に Flatten が必要です", c.name);
                }
                (LayerSpec::Conv2D(c), Some(FeatureShape::Flat(_))) => {
                    bail!("{}: Flatten 後に Conv2D は置けません", c.name);
                }
                (LayerSpec::MaxPooling2D(c), Some(FeatureShape::Flat(_))) => {
                    bail!("{}: Flatten 後に MaxPooling2D は置けません", c.name);
                }
                // 推論時は恒等写像
                (LayerSpec::Dropout(_), Some(_)) => {}
            }
        }

        let num_outputs = match shape {
            Some(FeatureShape::Flat(n)) if !denses.is_empty() => n,
            _ => bail!("最終レイヤが Dense ではありません ({})", arch.name),
        };

        Ok(Self {
            convs,
            pools,
            denses,
            plan: Ignored(plan),
            num_outputs,
        })
    }

    pub fn num_outputs(&self) -> usize {
        self.num_outputs
    }

    /// 順伝播
    ///
    /// # 引数
    /// - `images`: バッチ画像 [batch_size, channels, height, width]
    ///
    /// # 戻り値
    /// - クラスごとの出力 [batch_size, num_outputs]（最終レイヤの活性化適用済み）
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = Features::Spatial(images);

        for step in self.plan.0.iter() {
            x = match (*step, x) {
                (LayerStep::Conv { index, activation }, Features::Spatial(t)) => {
                    let t = self.convs[index].forward(t);
                    Features::Spatial(apply_activation(t, activation, 1))
                }
                (LayerStep::Pool { index }, Features::Spatial(t)) => {
                    Features::Spatial(self.pools[index].forward(t))
                }
                (LayerStep::Dense { index, activation }, features) => {
                    let t = self.denses[index].forward(features.into_flat());
                    Features::Flat(apply_activation(t, activation, 1))
                }
                (LayerStep::Flatten, features) => Features::Flat(features.into_flat()),
                // init で弾いているので到達しない組み合わせはそのまま流す
                (_, features) => features,
            };
        }

        x.into_flat()
    }

    /// NHWC `[batch, height, width, channels]` の入力で順伝播
    pub fn forward_nhwc(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        self.forward(images.permute([0, 3, 1, 2]))
    }

    /// 保存された重みの層数・形状がこのモデルと一致するか確認
    pub fn verify_record(&self, record: &DigitClassifierRecord<B>) -> Result<()> {
        if record.convs.len() != self.convs.len() || record.denses.len() != self.denses.len() {
            bail!(
                "重みの層数が一致しません: conv {} / {}, dense {} / {}",
                record.convs.len(),
                self.convs.len(),
                record.denses.len(),
                self.denses.len()
            );
        }

        for (i, (expected, loaded)) in self.convs.iter().zip(&record.convs).enumerate() {
            check_dims(
                &format!("conv[{}].weight", i),
                &expected.weight.val().dims(),
                &loaded.weight.val().dims(),
            )?;
            if let (Some(e), Some(l)) = (&expected.bias, &loaded.bias) {
                check_dims(&format!("conv[{}].bias", i), &e.val().dims(), &l.val().dims())?;
            }
        }
        for (i, (expected, loaded)) in self.denses.iter().zip(&record.denses).enumerate() {
            check_dims(
                &format!("dense[{}].weight", i),
                &expected.weight.val().dims(),
                &loaded.weight.val().dims(),
            )?;
            if let (Some(e), Some(l)) = (&expected.bias, &loaded.bias) {
                check_dims(&format!("dense[{}].bias", i), &e.val().dims(), &l.val().dims())?;
            }
        }
        Ok(())
    }
}

fn check_dims(name: &str, expected: &[usize], loaded: &[usize]) -> Result<()> {
    if expected != loaded {
        bail!("{} の形状が一致しません: 期待 {:?}, 実際 {:?}", name, expected, loaded);
    }
    Ok(())
}

fn apply_activation<B: Backend, const D: usize>(
    x: Tensor<B, D>,
    activation: Activation,
    dim: usize,
) -> Tensor<B, D> {
    match activation {
        Activation::Linear => x,
        Activation::Relu => activation::relu(x),
        Activation::Softmax => activation::softmax(x, dim),
    }
}
