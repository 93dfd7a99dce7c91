use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use recraft_contracts::events::{EventDetails, EventLog};
use recraft_contracts::nodes::{
    FieldKind, FieldSpec, NodeSpec, BACKGROUND_REMOVER_SPEC, BACKGROUND_REPLACER_SPEC,
    CLARITY_UPSCALER_SPEC, CLIENT_SPEC, CREATIVE_UPSCALER_SPEC, CRISP_UPSCALER_SPEC,
    GENERATIVE_UPSCALER_SPEC, IMAGE_GENERATOR_SPEC, IMAGE_TO_IMAGE_SPEC, INPAINTER_SPEC,
};
use recraft_contracts::registry::{NamedNode, NodeRegistry};
use serde_json::Value;

use crate::client::{Operation, RecraftClient, RequestParams};
use crate::codec::{decode_image, encode_image, encode_mask, ImageTensor, MaskTensor};
use crate::config::RecraftConfig;
use crate::error::RecraftError;
use crate::transport::{HttpTransport, Transport};

/// A value flowing into a node socket or widget.
#[derive(Debug, Clone)]
pub enum NodeValue {
    Text(String),
    Int(i64),
    Float(f64),
    Image(ImageTensor),
    Mask(MaskTensor),
    Client(RecraftClient),
}

impl NodeValue {
    fn describe(&self) -> &'static str {
        match self {
            NodeValue::Text(_) => "text",
            NodeValue::Int(_) => "integer",
            NodeValue::Float(_) => "float",
            NodeValue::Image(_) => "image",
            NodeValue::Mask(_) => "mask",
            NodeValue::Client(_) => "client",
        }
    }
}

impl From<&str> for NodeValue {
    fn from(value: &str) -> Self {
        NodeValue::Text(value.to_string())
    }
}

impl From<String> for NodeValue {
    fn from(value: String) -> Self {
        NodeValue::Text(value)
    }
}

impl From<i64> for NodeValue {
    fn from(value: i64) -> Self {
        NodeValue::Int(value)
    }
}

impl From<f64> for NodeValue {
    fn from(value: f64) -> Self {
        NodeValue::Float(value)
    }
}

impl From<ImageTensor> for NodeValue {
    fn from(value: ImageTensor) -> Self {
        NodeValue::Image(value)
    }
}

impl From<MaskTensor> for NodeValue {
    fn from(value: MaskTensor) -> Self {
        NodeValue::Mask(value)
    }
}

impl From<RecraftClient> for NodeValue {
    fn from(value: RecraftClient) -> Self {
        NodeValue::Client(value)
    }
}

pub type NodeInputs = BTreeMap<String, NodeValue>;

pub fn node_inputs<const N: usize>(pairs: [(&str, NodeValue); N]) -> NodeInputs {
    pairs
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

#[derive(Debug, Clone)]
pub enum NodeOutput {
    Client(RecraftClient),
    Image(ImageTensor),
}

impl NodeOutput {
    pub fn into_client(self) -> Result<RecraftClient> {
        match self {
            NodeOutput::Client(client) => Ok(client),
            NodeOutput::Image(_) => bail!("node produced an image, not a client"),
        }
    }

    pub fn into_image(self) -> Result<ImageTensor> {
        match self {
            NodeOutput::Image(image) => Ok(image),
            NodeOutput::Client(_) => bail!("node produced a client, not an image"),
        }
    }
}

/// Called with the finished-operation message and the result URL.
pub type ProgressFn = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Shared by every node run: configuration, the wire, and the optional log.
#[derive(Clone)]
pub struct NodeContext {
    config: RecraftConfig,
    transport: Arc<dyn Transport>,
    events: Option<EventLog>,
    progress: Option<ProgressFn>,
}

impl NodeContext {
    pub fn new(config: RecraftConfig) -> Self {
        Self::with_transport(config, Arc::new(HttpTransport::new()))
    }

    pub fn with_transport(config: RecraftConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            events: None,
            progress: None,
        }
    }

    pub fn with_events(mut self, events: EventLog) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_progress(mut self, progress: impl Fn(&str, &str) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(progress));
        self
    }

    pub fn config(&self) -> &RecraftConfig {
        &self.config
    }

    fn report(&self, spec: &NodeSpec, operation: &str, message: &str, url: &str) -> Result<()> {
        if let Some(progress) = self.progress.as_ref() {
            progress(message, url);
        }
        let Some(events) = self.events.as_ref() else {
            return Ok(());
        };
        let mut details = EventDetails::new();
        details.insert(
            "operation".to_string(),
            Value::String(operation.to_string()),
        );
        details.insert("message".to_string(), Value::String(message.to_string()));
        details.insert("url".to_string(), Value::String(url.to_string()));
        events
            .record("operation_finished", spec.id, details)
            .context("failed recording node event")?;
        Ok(())
    }
}

/// One host-visible node.
pub trait Node: Send + Sync {
    fn spec(&self) -> &'static NodeSpec;
    fn run(&self, ctx: &NodeContext, inputs: &NodeInputs) -> Result<NodeOutput>;
}

impl NamedNode for Box<dyn Node> {
    fn id(&self) -> &str {
        self.spec().id
    }

    fn display_name(&self) -> &str {
        self.spec().display_name
    }
}

pub type Registry = NodeRegistry<Box<dyn Node>>;

pub fn default_node_registry() -> Result<Registry> {
    NodeRegistry::new(vec![
        Box::new(ClientNode) as Box<dyn Node>,
        Box::new(ImageGenerator),
        Box::new(ImageToImageTransformer),
        Box::new(SingleImageNode::BACKGROUND_REMOVER),
        Box::new(BackgroundReplacer),
        Box::new(Inpainter),
        Box::new(SingleImageNode::CRISP_UPSCALER),
        Box::new(SingleImageNode::CREATIVE_UPSCALER),
        Box::new(SingleImageNode::CLARITY_UPSCALER),
        Box::new(SingleImageNode::GENERATIVE_UPSCALER),
    ])
}

/// Looks up `id` and runs it.
pub fn run_node(
    registry: &Registry,
    ctx: &NodeContext,
    id: &str,
    inputs: &NodeInputs,
) -> Result<NodeOutput> {
    let Some(node) = registry.get(id) else {
        bail!(
            "unknown node '{id}'; registered: {}",
            registry.list().join(", ")
        );
    };
    node.run(ctx, inputs)
}

/// Schema-aware view over raw inputs: fills defaults and rejects values
/// the schema does not allow.
struct Inputs<'a> {
    spec: &'static NodeSpec,
    values: &'a NodeInputs,
}

impl<'a> Inputs<'a> {
    fn new(spec: &'static NodeSpec, values: &'a NodeInputs) -> Self {
        Self { spec, values }
    }

    fn field(&self, name: &str) -> Result<&'static FieldSpec> {
        let spec: &'static NodeSpec = self.spec;
        spec.field(name)
            .with_context(|| format!("{} declares no input '{name}'", spec.id))
    }

    fn mismatch(&self, name: &str, value: &NodeValue, expected: &str) -> anyhow::Error {
        RecraftError::validation(format!(
            "Input '{name}' expects {expected}, got {}",
            value.describe()
        ))
    }

    fn text(&self, name: &str) -> Result<String> {
        let field = self.field(name)?;
        let value = match (self.values.get(name), field.kind) {
            (Some(NodeValue::Text(value)), _) => value.clone(),
            (Some(other), _) => return Err(self.mismatch(name, other, "text")),
            (None, FieldKind::Text { default, .. }) => default.to_string(),
            (None, _) => String::new(),
        };
        field
            .check_text(&value)
            .map_err(RecraftError::validation)?;
        Ok(value)
    }

    fn int(&self, name: &str) -> Result<i64> {
        let field = self.field(name)?;
        let value = match (self.values.get(name), field.kind) {
            (Some(NodeValue::Int(value)), _) => *value,
            (Some(other), _) => return Err(self.mismatch(name, other, "an integer")),
            (None, FieldKind::Int { default, .. }) => default,
            (None, _) => 0,
        };
        field.check_int(value).map_err(RecraftError::validation)?;
        Ok(value)
    }

    fn float(&self, name: &str) -> Result<f64> {
        let field = self.field(name)?;
        let value = match (self.values.get(name), field.kind) {
            (Some(NodeValue::Float(value)), _) => *value,
            (Some(NodeValue::Int(value)), _) => *value as f64,
            (Some(other), _) => return Err(self.mismatch(name, other, "a number")),
            (None, FieldKind::Float { default, .. }) => default,
            (None, _) => 0.0,
        };
        field
            .check_float(value)
            .map_err(RecraftError::validation)?;
        Ok(value)
    }

    fn socket(&self, name: &str) -> Result<&'a NodeValue> {
        self.field(name)?;
        self.values
            .get(name)
            .ok_or_else(|| RecraftError::validation(format!("Missing required input '{name}'")))
    }

    fn client(&self) -> Result<&'a RecraftClient> {
        match self.socket("client")? {
            NodeValue::Client(client) => Ok(client),
            other => Err(self.mismatch("client", other, "a client")),
        }
    }

    fn image(&self) -> Result<&'a ImageTensor> {
        match self.socket("image")? {
            NodeValue::Image(image) => Ok(image),
            other => Err(self.mismatch("image", other, "an image")),
        }
    }

    fn mask(&self) -> Result<&'a MaskTensor> {
        match self.socket("mask")? {
            NodeValue::Mask(mask) => Ok(mask),
            other => Err(self.mismatch("mask", other, "a mask")),
        }
    }

    fn prompt(&self) -> Result<String> {
        let prompt = self.text("prompt")?;
        if prompt.trim().is_empty() {
            return Err(RecraftError::validation("Prompt is required"));
        }
        Ok(prompt)
    }

    /// `0` leaves the choice to the service.
    fn seed(&self) -> Result<Option<u64>> {
        let seed = self.int("seed")?;
        Ok(u64::try_from(seed).ok().filter(|seed| *seed > 0))
    }
}

/// Downloads and decodes a result, logging it first.
fn finish(
    ctx: &NodeContext,
    spec: &'static NodeSpec,
    client: &RecraftClient,
    operation: &str,
    message: &str,
    url: &str,
) -> Result<NodeOutput> {
    ctx.report(spec, operation, message, url)?;
    let bytes = client.fetch_image(url)?;
    let image =
        decode_image(&bytes).with_context(|| format!("failed decoding Recraft result ({url})"))?;
    Ok(NodeOutput::Image(image))
}

pub struct ClientNode;

impl Node for ClientNode {
    fn spec(&self) -> &'static NodeSpec {
        &CLIENT_SPEC
    }

    fn run(&self, ctx: &NodeContext, inputs: &NodeInputs) -> Result<NodeOutput> {
        let inputs = Inputs::new(self.spec(), inputs);
        let token = inputs.text("api_token")?;
        let client = RecraftClient::from_config(&ctx.config, Some(&token), ctx.transport.clone())?;
        Ok(NodeOutput::Client(client))
    }
}

pub struct ImageGenerator;

impl Node for ImageGenerator {
    fn spec(&self) -> &'static NodeSpec {
        &IMAGE_GENERATOR_SPEC
    }

    fn run(&self, ctx: &NodeContext, inputs: &NodeInputs) -> Result<NodeOutput> {
        let inputs = Inputs::new(self.spec(), inputs);
        let client = inputs.client()?;
        let prompt = inputs.prompt()?;
        let params = RequestParams::new()
            .style(&inputs.text("style")?)
            .substyle(&inputs.text("substyle")?)
            .image_size(&inputs.text("image_size")?)
            .model(&inputs.text("model")?)
            .random_seed(inputs.seed()?);

        let url = client.generate_image(&prompt, params)?;
        finish(ctx, self.spec(), client, "generations", "Generated image", &url)
    }
}

pub struct ImageToImageTransformer;

impl Node for ImageToImageTransformer {
    fn spec(&self) -> &'static NodeSpec {
        &IMAGE_TO_IMAGE_SPEC
    }

    fn run(&self, ctx: &NodeContext, inputs: &NodeInputs) -> Result<NodeOutput> {
        let inputs = Inputs::new(self.spec(), inputs);
        let client = inputs.client()?;
        let prompt = inputs.prompt()?;
        let params = RequestParams::new()
            .prompt(&prompt)
            .strength(inputs.float("strength")?)
            .style(&inputs.text("style")?)
            .substyle(&inputs.text("substyle")?)
            .random_seed(inputs.seed()?);
        let image = encode_image(inputs.image()?.view())?;

        let url = client.image_to_image(image, params)?;
        finish(
            ctx,
            self.spec(),
            client,
            Operation::ImageToImage.endpoint(),
            "Image To Image finished",
            &url,
        )
    }
}

pub struct BackgroundReplacer;

impl Node for BackgroundReplacer {
    fn spec(&self) -> &'static NodeSpec {
        &BACKGROUND_REPLACER_SPEC
    }

    fn run(&self, ctx: &NodeContext, inputs: &NodeInputs) -> Result<NodeOutput> {
        let inputs = Inputs::new(self.spec(), inputs);
        let client = inputs.client()?;
        let prompt = inputs.prompt()?;
        let params = RequestParams::new()
            .prompt(&prompt)
            .style(&inputs.text("style")?)
            .substyle(&inputs.text("substyle")?)
            .random_seed(inputs.seed()?);
        let image = encode_image(inputs.image()?.view())?;

        let url = client.replace_background(image, params)?;
        finish(
            ctx,
            self.spec(),
            client,
            Operation::ReplaceBackground.endpoint(),
            "Replace background finished",
            &url,
        )
    }
}

pub struct Inpainter;

impl Node for Inpainter {
    fn spec(&self) -> &'static NodeSpec {
        &INPAINTER_SPEC
    }

    fn run(&self, ctx: &NodeContext, inputs: &NodeInputs) -> Result<NodeOutput> {
        let inputs = Inputs::new(self.spec(), inputs);
        let client = inputs.client()?;
        let prompt = inputs.prompt()?;
        let params = RequestParams::new()
            .prompt(&prompt)
            .style(&inputs.text("style")?)
            .substyle(&inputs.text("substyle")?)
            .random_seed(inputs.seed()?);
        let image = encode_image(inputs.image()?.view())?;
        let mask = encode_mask(inputs.mask()?.view())?;

        let url = client.inpaint(image, mask, params)?;
        finish(
            ctx,
            self.spec(),
            client,
            Operation::Inpaint.endpoint(),
            "Inpaint finished",
            &url,
        )
    }
}

/// Nodes that send only an image and a seed: background removal and the
/// four upscalers.
pub struct SingleImageNode {
    spec: &'static NodeSpec,
    operation: Operation,
    call: SingleImageCall,
    message: &'static str,
}

type SingleImageCall = fn(&RecraftClient, Vec<u8>, Option<u64>) -> Result<String>;

impl SingleImageNode {
    pub const BACKGROUND_REMOVER: SingleImageNode = SingleImageNode {
        spec: &BACKGROUND_REMOVER_SPEC,
        operation: Operation::RemoveBackground,
        call: RecraftClient::remove_background,
        message: "Removed background",
    };
    pub const CRISP_UPSCALER: SingleImageNode = SingleImageNode {
        spec: &CRISP_UPSCALER_SPEC,
        operation: Operation::CrispUpscale,
        call: RecraftClient::crisp_upscale,
        message: "Crisp upscale finished",
    };
    pub const CREATIVE_UPSCALER: SingleImageNode = SingleImageNode {
        spec: &CREATIVE_UPSCALER_SPEC,
        operation: Operation::CreativeUpscale,
        call: RecraftClient::creative_upscale,
        message: "Creative upscale finished",
    };
    pub const CLARITY_UPSCALER: SingleImageNode = SingleImageNode {
        spec: &CLARITY_UPSCALER_SPEC,
        operation: Operation::ClarityUpscale,
        call: RecraftClient::clarity_upscale,
        message: "Clarity upscale finished",
    };
    pub const GENERATIVE_UPSCALER: SingleImageNode = SingleImageNode {
        spec: &GENERATIVE_UPSCALER_SPEC,
        operation: Operation::GenerativeUpscale,
        call: RecraftClient::generative_upscale,
        message: "Generative upscale finished",
    };

    pub fn operation(&self) -> Operation {
        self.operation
    }
}

impl Node for SingleImageNode {
    fn spec(&self) -> &'static NodeSpec {
        self.spec
    }

    fn run(&self, ctx: &NodeContext, inputs: &NodeInputs) -> Result<NodeOutput> {
        let inputs = Inputs::new(self.spec, inputs);
        let client = inputs.client()?;
        let seed = inputs.seed()?;
        let image = encode_image(inputs.image()?.view())?;

        let url = (self.call)(client, image, seed)?;
        finish(
            ctx,
            self.spec,
            client,
            self.operation.endpoint(),
            self.message,
            &url,
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ndarray::{Array3, Array4};
    use recraft_contracts::events::EventLog;
    use recraft_contracts::nodes::{NODE_SPECS, SEED_MAX};
    use serde_json::json;

    use super::*;
    use crate::codec::decode_image;
    use crate::config::{Credential, RecraftConfig};
    use crate::error::recraft_error;
    use crate::testing::RecordingTransport;
    use crate::transport::FilePart;

    fn context(transport: &Arc<RecordingTransport>) -> NodeContext {
        NodeContext::with_transport(
            RecraftConfig::from_parts(None, None, None).with_api_base("https://api.test/v1"),
            transport.clone(),
        )
    }

    fn client(transport: &Arc<RecordingTransport>) -> anyhow::Result<RecraftClient> {
        RecraftClient::with_transport(
            Credential::new("node-token")?,
            "https://api.test/v1",
            transport.clone(),
        )
    }

    fn image() -> ImageTensor {
        Array4::from_elem((1, 2, 2, 3), 0.5)
    }

    fn validation_message(err: &anyhow::Error) -> Option<String> {
        match recraft_error(err) {
            Some(RecraftError::Validation(message)) => Some(message.clone()),
            _ => None,
        }
    }

    fn expect_err(result: Result<NodeOutput>) -> anyhow::Error {
        result
            .err()
            .unwrap_or_else(|| anyhow::anyhow!("expected the node to fail"))
    }

    #[test]
    fn default_registry_covers_the_catalog() -> anyhow::Result<()> {
        let registry = default_node_registry()?;
        assert_eq!(registry.len(), NODE_SPECS.len());
        for spec in NODE_SPECS {
            assert_eq!(registry.display_name(spec.id), Some(spec.display_name));
        }
        assert_eq!(registry.list()[0], "RecraftBackgroundRemover");
        Ok(())
    }

    #[test]
    fn unknown_node_is_reported_with_known_ids() -> anyhow::Result<()> {
        let transport = RecordingTransport::replying(json!({}));
        let err = expect_err(run_node(
            &default_node_registry()?,
            &context(&transport),
            "RecraftTeleporter",
            &NodeInputs::new(),
        ));
        assert!(err
            .to_string()
            .starts_with("unknown node 'RecraftTeleporter'; registered: RecraftBackgroundRemover"));
        Ok(())
    }

    #[test]
    fn client_node_requires_a_token() -> anyhow::Result<()> {
        let transport = RecordingTransport::replying(json!({}));
        let err = expect_err(ClientNode.run(
            &context(&transport),
            &node_inputs([("api_token", "".into())]),
        ));
        assert_eq!(
            recraft_error(&err),
            Some(&RecraftError::Configuration("API token is required".to_string()))
        );
        assert_eq!(transport.calls(), 0);
        Ok(())
    }

    #[test]
    fn client_node_falls_back_to_config_token() -> anyhow::Result<()> {
        let transport = RecordingTransport::replying(json!({"data": [{"url": "X"}]}));
        let ctx = NodeContext::with_transport(
            RecraftConfig::from_parts(None, Some("env-token".to_string()), None),
            transport.clone(),
        );
        let client = ClientNode.run(&ctx, &NodeInputs::new())?.into_client()?;
        client.generate_image("x", RequestParams::new())?;
        assert_eq!(transport.only_request()?.token.expose(), "env-token");
        Ok(())
    }

    #[test]
    fn empty_prompt_fails_before_any_network_call() -> anyhow::Result<()> {
        let transport = RecordingTransport::replying(json!({"image": {"url": "Y"}}));
        let ctx = context(&transport);
        let client = client(&transport)?;
        let mask: MaskTensor = Array3::zeros((1, 2, 2));
        let prompt_nodes: [&dyn Node; 4] = [
            &ImageGenerator,
            &ImageToImageTransformer,
            &BackgroundReplacer,
            &Inpainter,
        ];
        for node in prompt_nodes {
            let inputs = node_inputs([
                ("client", client.clone().into()),
                ("image", image().into()),
                ("mask", mask.clone().into()),
                ("prompt", "".into()),
            ]);
            let err = expect_err(node.run(&ctx, &inputs));
            assert_eq!(
                validation_message(&err).as_deref(),
                Some("Prompt is required"),
                "{}",
                node.spec().id
            );
        }
        assert_eq!(transport.calls(), 0);
        Ok(())
    }

    #[test]
    fn generator_sends_only_set_fields_and_decodes_result() -> anyhow::Result<()> {
        let transport = RecordingTransport::replying(json!({"data": [{"url": "https://img/1"}]}));
        let output = ImageGenerator
            .run(
                &context(&transport),
                &node_inputs([
                    ("client", client(&transport)?.into()),
                    ("prompt", "a paper crane".into()),
                    ("style", "digital_illustration".into()),
                    ("substyle", "".into()),
                    ("seed", 0i64.into()),
                ]),
            )?
            .into_image()?;

        assert_eq!(output.dim(), (1, 1, 2, 3));
        assert_eq!(output[[0, 0, 0, 0]], 1.0);
        assert_eq!(output[[0, 0, 1, 2]], 1.0);
        let request = transport.only_request()?;
        assert_eq!(
            request.body,
            crate::transport::RequestBody::Json(json!({
                "style": "digital_illustration",
                "prompt": "a paper crane",
            }))
        );
        assert_eq!(transport.fetched(), vec!["https://img/1".to_string()]);
        assert_eq!(transport.calls(), 2);
        Ok(())
    }

    #[test]
    fn invalid_choice_and_out_of_range_seed_are_rejected() -> anyhow::Result<()> {
        let transport = RecordingTransport::replying(json!({"data": [{"url": "X"}]}));
        let ctx = context(&transport);
        let client = client(&transport)?;

        let err = expect_err(ImageGenerator.run(
            &ctx,
            &node_inputs([
                ("client", client.clone().into()),
                ("prompt", "cat".into()),
                ("style", "oil_painting".into()),
            ]),
        ));
        assert!(validation_message(&err)
            .unwrap_or_default()
            .starts_with("Invalid value 'oil_painting' for 'style'"));

        let err = expect_err(ImageGenerator.run(
            &ctx,
            &node_inputs([
                ("client", client.into()),
                ("prompt", "cat".into()),
                ("seed", (SEED_MAX + 1).into()),
            ]),
        ));
        assert_eq!(
            validation_message(&err).as_deref(),
            Some("Value 2147483648 for 'seed' is outside [0, 2147483647]")
        );
        assert_eq!(transport.calls(), 0);
        Ok(())
    }

    #[test]
    fn image_to_image_defaults_strength_and_forwards_seed() -> anyhow::Result<()> {
        let transport = RecordingTransport::replying(json!({"image": {"url": "Y"}}));
        ImageToImageTransformer.run(
            &context(&transport),
            &node_inputs([
                ("client", client(&transport)?.into()),
                ("image", image().into()),
                ("prompt", "autumn".into()),
                ("seed", 1234i64.into()),
            ]),
        )?;
        let request = transport.only_request()?;
        assert_eq!(request.url, "https://api.test/v1/images/imageToImage");
        assert_eq!(request.field("strength"), Some("0.5"));
        assert_eq!(request.field("random_seed"), Some("1234"));
        assert_eq!(request.field("style"), None);
        let sent = request.file("image").map(|file| file.bytes.clone()).unwrap_or_default();
        assert_eq!(decode_image(&sent)?.dim(), (1, 2, 2, 3));
        Ok(())
    }

    #[test]
    fn strength_outside_unit_range_is_rejected() -> anyhow::Result<()> {
        let transport = RecordingTransport::replying(json!({"image": {"url": "Y"}}));
        let err = expect_err(ImageToImageTransformer.run(
            &context(&transport),
            &node_inputs([
                ("client", client(&transport)?.into()),
                ("image", image().into()),
                ("prompt", "autumn".into()),
                ("strength", 1.5f64.into()),
            ]),
        ));
        assert_eq!(
            validation_message(&err).as_deref(),
            Some("Value 1.5 for 'strength' is outside [0, 1]")
        );
        assert_eq!(transport.calls(), 0);
        Ok(())
    }

    #[test]
    fn inpainter_sends_binarised_mask() -> anyhow::Result<()> {
        let transport = RecordingTransport::replying(json!({"image": {"url": "Y"}}));
        let mask = Array3::from_shape_vec((1, 2, 2), vec![0.2f32, 0.5, 0.7, 0.49])?;
        Inpainter.run(
            &context(&transport),
            &node_inputs([
                ("client", client(&transport)?.into()),
                ("image", image().into()),
                ("mask", mask.into()),
                ("prompt", "open window".into()),
            ]),
        )?;
        let request = transport.only_request()?;
        let sent: Option<FilePart> = request.file("mask").cloned();
        let decoded = decode_image(&sent.map(|file| file.bytes).unwrap_or_default())?;
        assert_eq!(
            decoded.iter().copied().collect::<Vec<f32>>(),
            vec![0.0, 1.0, 1.0, 0.0]
        );
        assert_eq!(request.field("prompt"), Some("open window"));
        Ok(())
    }

    #[test]
    fn single_image_nodes_hit_their_endpoints() -> anyhow::Result<()> {
        let nodes = [
            SingleImageNode::BACKGROUND_REMOVER,
            SingleImageNode::CRISP_UPSCALER,
            SingleImageNode::CREATIVE_UPSCALER,
            SingleImageNode::CLARITY_UPSCALER,
            SingleImageNode::GENERATIVE_UPSCALER,
        ];
        for node in nodes {
            let transport = RecordingTransport::replying(json!({"image": {"url": "Y"}}));
            node.run(
                &context(&transport),
                &node_inputs([
                    ("client", client(&transport)?.into()),
                    ("image", image().into()),
                    ("seed", 0i64.into()),
                ]),
            )?;
            let request = transport.only_request()?;
            assert_eq!(
                request.url,
                format!("https://api.test/v1/images/{}", node.operation().endpoint())
            );
            assert_eq!(request.field("random_seed"), None);

            let transport = RecordingTransport::replying(json!({"image": {"url": "Y"}}));
            node.run(
                &context(&transport),
                &node_inputs([
                    ("client", client(&transport)?.into()),
                    ("image", image().into()),
                    ("seed", 7i64.into()),
                ]),
            )?;
            assert_eq!(transport.only_request()?.field("random_seed"), Some("7"));
        }
        Ok(())
    }

    #[test]
    fn whitespace_prompt_counts_as_empty() -> anyhow::Result<()> {
        let transport = RecordingTransport::replying(json!({"data": [{"url": "X"}]}));
        let err = expect_err(ImageGenerator.run(
            &context(&transport),
            &node_inputs([
                ("client", client(&transport)?.into()),
                ("prompt", " \n\t ".into()),
            ]),
        ));
        assert_eq!(
            validation_message(&err).as_deref(),
            Some("Prompt is required")
        );
        assert_eq!(transport.calls(), 0);
        Ok(())
    }

    #[test]
    fn missing_or_mistyped_sockets_are_validation_errors() -> anyhow::Result<()> {
        let transport = RecordingTransport::replying(json!({"image": {"url": "Y"}}));
        let ctx = context(&transport);
        let remover = SingleImageNode::BACKGROUND_REMOVER;

        let err = expect_err(remover.run(&ctx, &node_inputs([("client", client(&transport)?.into())])));
        assert_eq!(
            validation_message(&err).as_deref(),
            Some("Missing required input 'image'")
        );

        let err = expect_err(remover.run(
            &ctx,
            &node_inputs([("client", "token".into()), ("image", image().into())]),
        ));
        assert_eq!(
            validation_message(&err).as_deref(),
            Some("Input 'client' expects a client, got text")
        );
        assert_eq!(transport.calls(), 0);
        Ok(())
    }

    #[test]
    fn service_errors_pass_through_nodes_verbatim() -> anyhow::Result<()> {
        let transport =
            RecordingTransport::replying(json!({"code": "no_credits", "message": "Not enough credits"}));
        let err = expect_err(SingleImageNode::CRISP_UPSCALER.run(
            &context(&transport),
            &node_inputs([("client", client(&transport)?.into()), ("image", image().into())]),
        ));
        assert_eq!(err.to_string(), "Not enough credits");
        assert!(transport.fetched().is_empty());
        Ok(())
    }

    #[test]
    fn finished_operations_are_logged() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let transport = RecordingTransport::replying(json!({"image": {"url": "https://img/9"}}));
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let ctx = context(&transport)
            .with_events(EventLog::new(&path, "session-x"))
            .with_progress(move |message, url| {
                if let Ok(mut lines) = sink.lock() {
                    lines.push(format!("{message} {url}"));
                }
            });

        run_node(
            &default_node_registry()?,
            &ctx,
            "RecraftBackgroundRemover",
            &node_inputs([("client", client(&transport)?.into()), ("image", image().into())]),
        )?;

        let lines = seen.lock().map(|lines| lines.clone()).unwrap_or_default();
        assert_eq!(lines, vec!["Removed background https://img/9".to_string()]);

        let events = EventLog::read_all(&path)?;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, "operation_finished");
        assert_eq!(events[0].node, "RecraftBackgroundRemover");
        assert_eq!(events[0].details["operation"], "removeBackground");
        assert_eq!(events[0].details["message"], "Removed background");
        assert_eq!(events[0].details["url"], "https://img/9");
        Ok(())
    }
}
