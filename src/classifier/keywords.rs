//! Base keyword tables for local classification
//!
//! All entries are pre-normalized (lowercase, no accents) because scoring
//! matches them as substrings of the normalized message. The tables are the
//! static half of the classifier; the learned half lives in the weighted
//! pattern map and is adjusted from arbitration outcomes at runtime.

/// Knowledge route: company/product questions plus the whole real-estate
/// professional vocabulary. Listing-title phrasing is folded in here because
/// title help is answered by the same information responder.
pub const KNOWLEDGE_KEYWORDS: &[&str] = &[
    // Producto y plataforma
    "portal inmobiliario",
    "crm",
    "tecnologia",
    "capacitacion",
    "manual del asesor",
    // Negocio inmobiliario
    "propiedad",
    "inmueble",
    "casa",
    "departamento",
    "depto",
    "terreno",
    "local comercial",
    "oficina",
    "ph",
    // Operaciones
    "venta",
    "alquiler",
    "alquila",
    "compra",
    "vende",
    // Terminos profesionales
    "captacion",
    "lead",
    "leads",
    "comision",
    "comisiones",
    "honorarios",
    "asesor",
    "tasacion",
    "valuacion",
    "escritura",
    // Marketing y publicacion
    "publicacion",
    "publicar",
    "anuncio",
    "marketing",
    "fotos",
    "descripcion",
    // Titulos de publicacion
    "titulo",
    "titulos",
    "armar titulo",
    "crear titulo",
    "hacer titulo",
    "ayuda con titulo",
    "titulo de publicacion",
    "como hacer un titulo",
    // Ubicacion
    "barrio",
    "ubicacion",
    "direccion",
    // Caracteristicas
    "ambientes",
    "habitacion",
    "dormitorio",
    "bano",
    "cochera",
    "garage",
    "balcon",
    "terraza",
    "jardin",
    "pileta",
    "piscina",
    "amenities",
];

/// Market-data route: price questions, zones, market trends, investment
pub const MARKET_DATA_KEYWORDS: &[&str] = &[
    // Preguntas de precio
    "cuanto vale",
    "cuanto cuesta",
    "precio",
    "precios",
    "valor",
    "cotizacion",
    // Tipo de propiedad en contexto de precio
    "depto",
    "m2",
    "metro cuadrado",
    "metros cuadrados",
    // Zonas y barrios
    "palermo",
    "belgrano",
    "recoleta",
    "caballito",
    "san isidro",
    "vicente lopez",
    "zona norte",
    "zona sur",
    "zona oeste",
    "caba",
    "capital federal",
    "gba",
    // Mercado
    "mercado",
    "tendencia",
    "tendencias",
    "sube",
    "baja",
    "evolucion",
    "demanda",
    "oferta",
    "stock",
    "tiempo de venta",
    // Moneda
    "usd",
    "dolar",
    "dolares",
    // Inversion
    "invertir",
    "inversion",
    "rentabilidad",
    "ganancia",
    "retorno",
    "roi",
    // Comparacion
    "comparar",
    "comparacion",
    "vs",
    "versus",
    "mejor zona",
    "conviene",
];

/// Conversation route: greetings, thanks, small talk
pub const CONVERSATION_KEYWORDS: &[&str] = &[
    // Saludos
    "hola",
    "hey",
    "buenos dias",
    "buenas tardes",
    "buenas noches",
    "buen dia",
    // Agradecimientos
    "gracias",
    "perfecto",
    "genial",
    "excelente",
    "ok",
    "dale",
    // Casual
    "como estas",
    "que tal",
    "todo bien",
    "chau",
    "adios",
    "hasta luego",
];

/// Bare greetings that short-circuit classification entirely
pub const GREETINGS: &[&str] = &["hola", "hey", "buenos dias", "buenas tardes", "buenas noches"];

/// Stopwords excluded from learned-keyword extraction
pub const STOPWORDS: &[&str] = &[
    "el", "la", "de", "que", "en", "un", "una", "por", "para", "con", "es", "como", "me", "te",
    "se", "mi", "tu", "su", "si", "no", "mas", "pero", "este", "esta", "los", "las", "del", "al",
];
