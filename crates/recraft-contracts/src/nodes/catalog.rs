use super::schema::{FieldKind, FieldSpec, NodeSpec, SocketType};

pub const CATEGORY: &str = "RecraftAI";

pub const STYLE_CHOICES: &[&str] = &["", "any", "realistic_image", "digital_illustration"];

pub const SUBSTYLE_CHOICES: &[&str] = &[
    "",
    "b_and_w",
    "hard_flash",
    "hdr",
    "natural_light",
    "studio_portrait",
    "enterprise",
    "motion_blur",
    "pixel_art",
    "hand_drawn",
    "grain",
    "infantile_sketch",
    "2d_art_poster",
    "handmade_3d",
    "hand_drawn_outline",
    "engraving_color",
    "2d_art_poster_2",
];

pub const IMAGE_SIZE_CHOICES: &[&str] = &[
    "",
    "1024x1024",
    "1024x1280",
    "1024x1365",
    "1024x1434",
    "1024x1536",
    "1024x1707",
    "1024x1820",
    "1024x2048",
    "1280x1024",
    "1365x1024",
    "1434x1024",
    "1536x1024",
    "1707x1024",
    "1820x1024",
    "2048x1024",
];

pub const MODEL_CHOICES: &[&str] = &["", "recraftv3", "recraft20b"];

pub const SEED_MAX: i64 = 2_147_483_647;

pub const CLIENT_NODE: &str = "RecraftClient";
pub const IMAGE_GENERATOR_NODE: &str = "RecraftImageGenerator";
pub const IMAGE_TO_IMAGE_NODE: &str = "RecraftImageToImageTransformer";
pub const BACKGROUND_REMOVER_NODE: &str = "RecraftBackgroundRemover";
pub const BACKGROUND_REPLACER_NODE: &str = "RecraftBackgroundReplacer";
pub const INPAINTER_NODE: &str = "RecraftInpainter";
pub const CRISP_UPSCALER_NODE: &str = "RecraftCrispUpscaler";
pub const CREATIVE_UPSCALER_NODE: &str = "RecraftCreativeUpscaler";
pub const CLARITY_UPSCALER_NODE: &str = "RecraftClarityUpscaler";
pub const GENERATIVE_UPSCALER_NODE: &str = "RecraftGenerativeUpscaler";

const API_TOKEN: FieldSpec = FieldSpec {
    name: "api_token",
    kind: FieldKind::Text {
        multiline: false,
        default: "",
    },
    required: true,
    lazy: false,
};

const CLIENT: FieldSpec = socket("client", SocketType::RecraftClient);
const IMAGE: FieldSpec = socket("image", SocketType::Image);
const MASK: FieldSpec = socket("mask", SocketType::Mask);

const PROMPT: FieldSpec = FieldSpec {
    name: "prompt",
    kind: FieldKind::Text {
        multiline: true,
        default: "",
    },
    required: true,
    lazy: false,
};

const STRENGTH: FieldSpec = FieldSpec {
    name: "strength",
    kind: FieldKind::Float {
        default: 0.5,
        min: 0.0,
        max: 1.0,
        step: 0.01,
    },
    required: true,
    lazy: false,
};

const STYLE: FieldSpec = choice("style", STYLE_CHOICES);
const SUBSTYLE: FieldSpec = choice("substyle", SUBSTYLE_CHOICES);
const IMAGE_SIZE: FieldSpec = choice("image_size", IMAGE_SIZE_CHOICES);
const MODEL: FieldSpec = choice("model", MODEL_CHOICES);

const SEED: FieldSpec = FieldSpec {
    name: "seed",
    kind: FieldKind::Int {
        default: 0,
        min: 0,
        max: SEED_MAX,
        step: 1,
    },
    required: false,
    lazy: true,
};

// The crisp upscaler never declared its seed lazy.
const EAGER_SEED: FieldSpec = FieldSpec { lazy: false, ..SEED };

const fn socket(name: &'static str, socket: SocketType) -> FieldSpec {
    FieldSpec {
        name,
        kind: FieldKind::Socket(socket),
        required: true,
        lazy: false,
    }
}

const fn choice(name: &'static str, options: &'static [&'static str]) -> FieldSpec {
    FieldSpec {
        name,
        kind: FieldKind::Choice { options },
        required: false,
        lazy: false,
    }
}

// Shared shape of every image-producing node; each spec overrides identity and inputs.
const IMAGE_NODE: NodeSpec = NodeSpec {
    id: "",
    display_name: "",
    category: CATEGORY,
    function: "",
    description: "",
    inputs: &[],
    output: SocketType::Image,
    output_name: "image",
    output_node: true,
};

pub const CLIENT_SPEC: NodeSpec = NodeSpec {
    id: CLIENT_NODE,
    display_name: "RecraftAI Client",
    category: CATEGORY,
    function: "make",
    description: "Create a RecraftAI client with the given API token",
    inputs: &[API_TOKEN],
    output: SocketType::RecraftClient,
    output_name: "client",
    output_node: false,
};

pub const IMAGE_GENERATOR_SPEC: NodeSpec = NodeSpec {
    id: IMAGE_GENERATOR_NODE,
    display_name: "RecraftAI Image Generator",
    function: "generate",
    description: "Generate an image given a text prompt",
    inputs: &[CLIENT, PROMPT, STYLE, SUBSTYLE, IMAGE_SIZE, MODEL, SEED],
    ..IMAGE_NODE
};

pub const IMAGE_TO_IMAGE_SPEC: NodeSpec = NodeSpec {
    id: IMAGE_TO_IMAGE_NODE,
    display_name: "RecraftAI Image To Image",
    function: "image_to_image",
    description: "Transform an input image into an output image given a text prompt",
    inputs: &[CLIENT, IMAGE, PROMPT, STRENGTH, STYLE, SUBSTYLE, SEED],
    ..IMAGE_NODE
};

pub const BACKGROUND_REMOVER_SPEC: NodeSpec = NodeSpec {
    id: BACKGROUND_REMOVER_NODE,
    display_name: "RecraftAI Background Remover",
    function: "remove_background",
    description: "Remove background of the given image",
    inputs: &[CLIENT, IMAGE, SEED],
    ..IMAGE_NODE
};

pub const BACKGROUND_REPLACER_SPEC: NodeSpec = NodeSpec {
    id: BACKGROUND_REPLACER_NODE,
    display_name: "RecraftAI Background Replacer",
    function: "replace_background",
    description: "Replace image background based on a given prompt",
    inputs: &[CLIENT, IMAGE, PROMPT, STYLE, SUBSTYLE, SEED],
    ..IMAGE_NODE
};

pub const INPAINTER_SPEC: NodeSpec = NodeSpec {
    id: INPAINTER_NODE,
    display_name: "RecraftAI Inpainter",
    function: "inpaint",
    description: "Inpaint an image given mask and prompt",
    inputs: &[CLIENT, IMAGE, MASK, PROMPT, STYLE, SUBSTYLE, SEED],
    ..IMAGE_NODE
};

pub const CRISP_UPSCALER_SPEC: NodeSpec = NodeSpec {
    id: CRISP_UPSCALER_NODE,
    display_name: "RecraftAI Crisp Upscaler",
    function: "crisp_upscale",
    description: "Crisp upscale of the given image",
    inputs: &[CLIENT, IMAGE, EAGER_SEED],
    ..IMAGE_NODE
};

pub const CREATIVE_UPSCALER_SPEC: NodeSpec = NodeSpec {
    id: CREATIVE_UPSCALER_NODE,
    display_name: "RecraftAI Creative Upscaler",
    function: "creative_upscale",
    description: "Creative upscale of the given image",
    inputs: &[CLIENT, IMAGE, SEED],
    ..IMAGE_NODE
};

pub const CLARITY_UPSCALER_SPEC: NodeSpec = NodeSpec {
    id: CLARITY_UPSCALER_NODE,
    display_name: "RecraftAI Clarity Upscaler",
    function: "clarity_upscale",
    description: "Clarity upscale of the given image",
    inputs: &[CLIENT, IMAGE, SEED],
    ..IMAGE_NODE
};

pub const GENERATIVE_UPSCALER_SPEC: NodeSpec = NodeSpec {
    id: GENERATIVE_UPSCALER_NODE,
    display_name: "RecraftAI Generative Upscaler",
    function: "generative_upscale",
    description: "Generative upscale of the given image",
    inputs: &[CLIENT, IMAGE, SEED],
    ..IMAGE_NODE
};

/// Every node in registration order.
pub const NODE_SPECS: &[NodeSpec] = &[
    CLIENT_SPEC,
    IMAGE_GENERATOR_SPEC,
    IMAGE_TO_IMAGE_SPEC,
    BACKGROUND_REMOVER_SPEC,
    BACKGROUND_REPLACER_SPEC,
    INPAINTER_SPEC,
    CRISP_UPSCALER_SPEC,
    CREATIVE_UPSCALER_SPEC,
    CLARITY_UPSCALER_SPEC,
    GENERATIVE_UPSCALER_SPEC,
];

pub fn node_spec(id: &str) -> Option<&'static NodeSpec> {
    NODE_SPECS.iter().find(|spec| spec.id == id)
}
